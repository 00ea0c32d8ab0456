//! ackline-client: relays console lines to an ackline server.

use ackline::client::{ClientError, Session};
use ackline::logging::{self, LogTarget};
use ackline::ClientConfig;
use std::net::SocketAddr;
use tokio::io::BufReader;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::load()?;

    logging::init(&config.log_level, LogTarget::Stderr);

    let addr = config.server_addr()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime
        .block_on(relay(addr, config.sentinels))
        .inspect_err(|e| eprintln!("[ERROR] {e}"))?;

    Ok(())
}

async fn relay(addr: SocketAddr, sentinels: Vec<String>) -> Result<(), ClientError> {
    let mut session = Session::connect(addr, sentinels).await?;
    session
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    Ok(())
}
