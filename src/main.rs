//! ackline-server: accepts TCP connections and acknowledges every line.

use ackline::logging::{self, LogTarget};
use ackline::{Config, Listener};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    logging::init(&config.log_level, LogTarget::Stdout);

    info!(
        host = %config.host,
        port = config.port,
        pool_size = config.pool_size,
        queue_depth = config.queue_depth,
        threads = config.runtime_threads(),
        "Starting ackline server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime_threads())
        .thread_name("ackline-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let listener = Listener::new(config);
        listener
            .start_with_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await
    })?;

    info!("Server stopped");
    Ok(())
}
