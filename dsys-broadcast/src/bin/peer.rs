use anyhow::Result;
use clap::Parser;
use dsys_broadcast::Peer;
use dsys_runtime::{Address, Communicator, Message};
use log::info;

/// Ordered reliable broadcast peer (spec §4.2, §6.2).
///
/// Local `SEND` commands are read from stdin, one message body per line.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Peer name (should be unique)
    #[arg(short = 'n', default_value = "peer1")]
    name: String,

    /// Listen on specified address, host:port
    #[arg(short = 'l', default_value = "127.0.0.1:9701")]
    addr: String,

    /// Comma separated list of peers (including self)
    #[arg(short = 'p', default_value = "127.0.0.1:9701,127.0.0.1:9702")]
    peers: String,

    /// Print debugging info
    #[arg(short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        dsys_runtime::logging::init_with_directives("debug");
    } else {
        dsys_runtime::logging::init();
    }

    let addr: Address = args.addr.parse()?;
    let peers = args
        .peers
        .split(',')
        .map(str::parse)
        .collect::<Result<Vec<Address>, _>>()?
        .into_iter()
        .filter(|p| p != &addr)
        .collect::<Vec<_>>();

    let mut comm = Communicator::bind_udp(args.name.clone(), addr).await?;
    let addr = comm.addr().clone();
    let inbox = comm.inbox_sender();
    let mut outbox = comm.take_outbox();

    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = inbox.send(Message::text("SEND", line, addr.clone()).local());
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            info!("{}", msg.body_str().unwrap_or_default());
        }
    });

    Peer::new(comm, args.name, peers).run().await;
    Ok(())
}
