//! friscy-test-server: HTTP fixture for the friscy networking tests
//!
//! Listens on a TCP port and answers every request with a JSON document
//! describing what was received:
//! - `GET <path>`: path, headers and a timestamp
//! - `POST <path>`: path, body (first 1000 characters) and its length
//!
//! Usage: `friscy-test-server [port]` (default 8080)

mod config;
mod http;
mod logging;
mod payload;
mod server;

use config::Config;
use server::{Server, ShutdownSignal};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load();

    // Initialize logging
    logging::init(&config);

    info!(
        host = %config.host,
        port = config.port,
        "Starting friscy-test-server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(&config).await?;

    // Take over SIGINT before telling anyone to press Ctrl+C.
    let shutdown = ShutdownSignal::install()?;
    print!("{}", banner(server.local_addr()?.port()));

    server.run_until(shutdown.recv()).await?;

    println!("{SHUTDOWN_MESSAGE}");
    Ok(())
}

const SHUTDOWN_MESSAGE: &str = "\nShutting down...";

fn banner(port: u16) -> String {
    format!(
        "Test server listening on http://localhost:{port}\n\
         Endpoints:\n\
         \x20 GET  http://localhost:{port}/          - Returns JSON status\n\
         \x20 GET  http://localhost:{port}/test      - Returns JSON with path\n\
         \x20 POST http://localhost:{port}/echo      - Echoes POST body\n\
         \n\
         Press Ctrl+C to stop\n"
    )
}
