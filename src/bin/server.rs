//! TCP chat server with broadcast support.
//!
//! Accepts connections, tracks logged-in users, and fans every message out
//! to all registered sessions.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 60000
//! ```

use clap::Parser;

use stammtisch::common::logger::setup_logger;
use stammtisch::server::ChatServer;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "TCP chat server with broadcast support", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = 60000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let server = match ChatServer::bind(&args.host, args.port).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind {}:{}: {}", args.host, args.port, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run_until_ctrl_c().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
