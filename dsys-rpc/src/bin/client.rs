use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dsys_rpc::{StoreProxy, DEFAULT_CALL_TIMEOUT};
use dsys_runtime::{Address, Communicator, Message};
use log::info;
use serde::Deserialize;
use serde_json::Value;

/// Idempotent RPC client proxy (spec §4.3, §6.2).
///
/// Local commands are read from stdin as `CALL func arg1 arg2 ...`, e.g.
/// `put k v True`, `get k`, `append k v`, `remove k`.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Client name
    #[arg(short = 'n', default_value = "client")]
    name: String,

    /// Listen on specified address, host:port
    #[arg(short = 'l', default_value = "127.0.0.1:9801")]
    addr: String,

    /// RPC server address
    #[arg(short = 's', default_value = "127.0.0.1:9701")]
    server_addr: String,

    /// Print debugging info
    #[arg(short = 'd')]
    debug: bool,

    /// Optional TOML file of tuning overrides (call retry timeout); a flag
    /// given on the command line always wins.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Reply timeout in milliseconds before retrying (or, for `append`,
    /// giving up) (spec §4.3 default: 1000)
    #[arg(long)]
    call_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileTuning {
    call_timeout_ms: Option<u64>,
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
    let call_timeout = dsys_runtime::config::resolve(
        args.call_timeout_ms.map(Duration::from_millis),
        file_tuning.call_timeout_ms.map(Duration::from_millis),
        DEFAULT_CALL_TIMEOUT,
    );

    let addr: Address = args.addr.parse()?;
    let server_addr: Address = args.server_addr.parse()?;

    let comm = Communicator::bind_udp(args.name, addr).await?;
    let addr = comm.addr().clone();
    let mut proxy = StoreProxy::new(comm, server_addr).with_call_timeout(call_timeout);

    let inbox = proxy.inbox_sender();
    let mut outbox = proxy.take_outbox();

    let stdin_addr = addr.clone();
    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = inbox.send(Message::text("CALL", line, stdin_addr.clone()).local());
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            info!("{}: {}", msg.msg_type, msg.body);
        }
    });

    loop {
        let Some(cmd) = proxy.next_local_command().await else {
            return Ok(());
        };
        if cmd.msg_type != "CALL" {
            continue;
        }
        let line = cmd.body_str().unwrap_or_default();
        let mut parts = line.split_whitespace();
        let Some(func) = parts.next() else { continue };
        let call_args: Vec<Value> = parts.map(parse_arg).collect();

        let result = match func {
            "get" if call_args.len() == 1 => proxy.get(arg_string(&call_args[0])).await,
            "put" if call_args.len() == 3 => {
                proxy
                    .put(
                        arg_string(&call_args[0]),
                        call_args[1].clone(),
                        call_args[2].as_bool().unwrap_or(false),
                    )
                    .await
            }
            "append" if call_args.len() == 2 => {
                proxy.append(arg_string(&call_args[0]), call_args[1].clone()).await
            }
            "remove" if call_args.len() == 1 => proxy.remove(arg_string(&call_args[0])).await,
            other => Err(dsys_rpc::RpcError::Malformed(format!(
                "unrecognized command: {other} (args: {})",
                call_args.len()
            ))),
        };

        match result {
            Ok(body) => proxy.send_local(Message::new("RESULT", body, addr.clone())),
            Err(err) => proxy.send_local(Message::text("ERROR", err.to_string(), addr.clone())),
        }
    }
}

fn parse_arg(raw: &str) -> Value {
    match raw {
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn arg_string(v: &Value) -> String {
    v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())
}
