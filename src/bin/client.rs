//! Terminal chat client.
//!
//! Connects to the chat server, logs in under a display name, sends typed
//! lines, and logs out on `/quit`, waiting for the server's LEAVE echo
//! before tearing anything down.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin client -- --user Alice
//! cargo run --bin client -- -u Bob --host 192.168.0.10 --port 60000
//! ```

use clap::Parser;

use stammtisch::client::run_client;
use stammtisch::common::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "Terminal client for the TCP broadcast chat", long_about = None)]
struct Args {
    /// Display name to log in with
    #[arg(short = 'u', long)]
    user: String,

    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value_t = 60000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Keep the transcript readable: log warnings and above by default.
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();

    if let Err(e) = run_client(args.host, args.port, args.user).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
