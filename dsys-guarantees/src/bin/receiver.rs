use anyhow::Result;
use clap::Parser;
use dsys_guarantees::Receiver;
use dsys_runtime::{Address, Communicator};
use log::info;

/// Receiver half of the delivery-guarantee exercise (spec §4.1, §6.2).
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Receiver name (should be unique)
    #[arg(short = 'n', default_value = "receiver")]
    name: String,

    /// Listen on specified address, host:port
    #[arg(short = 'l', default_value = "127.0.0.1:9701")]
    addr: String,

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
    let mut comm = Communicator::bind_udp(args.name, addr).await?;
    let mut outbox = comm.take_outbox();

    tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            info!("delivered: {} {:?}", msg.msg_type, msg.body);
        }
    });

    Receiver::new(comm).run().await;
    Ok(())
}
