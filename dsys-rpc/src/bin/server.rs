use anyhow::Result;
use clap::Parser;
use dsys_rpc::Server;
use dsys_runtime::{Address, Communicator};

/// In-memory RPC store server (spec §4.3).
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Server name
    #[arg(short = 'n', default_value = "server")]
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
    let comm = Communicator::bind_udp(args.name, addr).await?;
    Server::new(comm).run().await;
    Ok(())
}
