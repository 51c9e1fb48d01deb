use std::{error::Error, net::SocketAddr};

use clap::Parser;
use protocon::PeerServer;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for gateway connections at address
    address: SocketAddr,
    /// Client ids to accept on sign-in without a prior sign-up
    #[arg(long = "known-client")]
    known_clients: Vec<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let server = cli
        .known_clients
        .into_iter()
        .fold(PeerServer::bind(cli.address)?, PeerServer::with_known_client);

    server.listen()?;
    Ok(())
}
