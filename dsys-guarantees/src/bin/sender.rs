use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dsys_guarantees::{Sender, DEFAULT_ECHO_TIMEOUT};
use dsys_runtime::{Address, Communicator, Message};
use serde::Deserialize;

/// Sender half of the delivery-guarantee exercise (spec §4.1, §6.2).
///
/// Local commands are read from stdin, one per line, as `TYPE body`, e.g.
/// `INFO-3 hello world`.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Sender name (should be unique)
    #[arg(short = 'n', default_value = "sender")]
    name: String,

    /// Receiver address, host:port
    #[arg(short = 'r', default_value = "127.0.0.1:9701")]
    recv_addr: String,

    /// Print debugging info
    #[arg(short = 'd')]
    debug: bool,

    /// Local address to bind to, host:port
    #[arg(short = 'l', long = "listen", default_value = "127.0.0.1:0")]
    addr: String,

    /// Optional TOML file of tuning overrides (echo retransmission interval);
    /// a flag given on the command line always wins.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Echo retransmission interval in milliseconds (spec §4.1 default: 500)
    #[arg(long)]
    echo_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileTuning {
    echo_timeout_ms: Option<u64>,
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
    let echo_timeout = dsys_runtime::config::resolve(
        args.echo_timeout_ms.map(Duration::from_millis),
        file_tuning.echo_timeout_ms.map(Duration::from_millis),
        DEFAULT_ECHO_TIMEOUT,
    );

    let addr: Address = args.addr.parse()?;
    let recv_addr: Address = args.recv_addr.parse()?;
    let comm = Communicator::bind_udp(args.name, addr).await?;
    let addr = comm.addr().clone();
    let inbox = comm.inbox_sender();

    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut parts = line.splitn(2, ' ');
            let msg_type = match parts.next() {
                Some(t) if !t.is_empty() => t,
                _ => continue,
            };
            let body = parts.next().unwrap_or_default().to_string();
            let _ = inbox.send(Message::text(msg_type, body, addr.clone()).local());
        }
    });

    Sender::new(comm, recv_addr)
        .with_echo_timeout(echo_timeout)
        .run()
        .await;
    Ok(())
}
