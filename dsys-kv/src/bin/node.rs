use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dsys_kv::{Node, Tuning};
use dsys_runtime::{Address, Message, Runtime};
use log::info;
use serde::Deserialize;

/// Sharded KV node (spec §4.4, §6.2).
///
/// Driven entirely by local commands on stdin, one per line: `JOIN addr`,
/// `LEAVE`, `GET_MEMBERS`, `GET key`, `PUT key=value`, `DELETE key`,
/// `LOOKUP key`, `COUNT_RECORDS`, `DUMP_KEYS`.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Node name (should be unique)
    #[arg(short = 'n', default_value = "1")]
    name: String,

    /// Listen on specified address, host:port
    #[arg(short = 'l', default_value = "127.0.0.1:9701")]
    addr: String,

    /// Print debugging info
    #[arg(short = 'd')]
    debug: bool,

    /// Optional TOML file of tuning overrides (replication fanout, failure
    /// detector intervals); a flag given on the command line always wins.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Replication / gossip fanout k (spec §4.4.4 default: 5)
    #[arg(long)]
    fanout: Option<usize>,

    /// `checkLive` probe interval in seconds (spec §4.4.4 default: 2)
    #[arg(long)]
    check_live_interval_secs: Option<u64>,

    /// Probe response timeout in seconds (spec §4.4.4 default: 2)
    #[arg(long)]
    probe_timeout_secs: Option<u64>,

    /// `checkDead` re-probe interval in seconds (spec §4.4.4 default: 10)
    #[arg(long)]
    check_dead_interval_secs: Option<u64>,
}

/// Mirrors `Args`' tuning fields so a TOML file can supply any of them.
#[derive(Debug, Default, Deserialize)]
struct FileTuning {
    fanout: Option<usize>,
    check_live_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    check_dead_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        dsys_runtime::logging::init_with_directives("debug");
    } else {
        dsys_runtime::logging::init();
    }

    let file_tuning = match &args.config {
        Some(path) => dsys_runtime::config::try_load::<FileTuning>(path)?,
        None => FileTuning::default(),
    };
    let default = Tuning::default();
    let tuning = Tuning {
        fanout: dsys_runtime::config::resolve(args.fanout, file_tuning.fanout, default.fanout),
        check_live_interval: dsys_runtime::config::resolve(
            args.check_live_interval_secs.map(Duration::from_secs),
            file_tuning.check_live_interval_secs.map(Duration::from_secs),
            default.check_live_interval,
        ),
        probe_timeout: dsys_runtime::config::resolve(
            args.probe_timeout_secs.map(Duration::from_secs),
            file_tuning.probe_timeout_secs.map(Duration::from_secs),
            default.probe_timeout,
        ),
        check_dead_interval: dsys_runtime::config::resolve(
            args.check_dead_interval_secs.map(Duration::from_secs),
            file_tuning.check_dead_interval_secs.map(Duration::from_secs),
            default.check_dead_interval,
        ),
        ack_delay: default.ack_delay,
    };

    let addr: Address = args.addr.parse()?;
    let node = Node::with_tuning(args.name.clone(), tuning);
    let mut runtime = Runtime::bind_udp(args.name, addr, node).await?;
    let addr = runtime.addr().clone();

    let inbox = runtime.inbox_sender();
    let mut outbox = runtime.take_outbox();

    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some((cmd, rest)) = line.split_once(' ').map(|(c, r)| (c, r.to_string())) else {
                let _ = inbox.send(Message::empty(line, addr.clone()).local());
                continue;
            };
            let _ = inbox.send(Message::text(cmd, rest, addr.clone()).local());
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            info!("{}: {}", msg.msg_type, msg.body);
        }
    });

    runtime.run().await;
    Ok(())
}
