//! Chat client entry point.
//!
//! # Usage
//!
//! ```text
//! chat-client [--server <ADDR>]
//!
//! Options:
//!   --server <ADDR>  Chat server address [env: CHAT_SERVER_ADDR] [default: 127.0.0.1:27020]
//! ```
//!
//! Every line typed is sent to the server, which relays it to everyone else.
//! Lines relayed from other clients are printed on stdout; log output goes to
//! stderr so the two do not mix.  Type `/quit` (or press Ctrl-C) to leave.

use std::io::BufReader;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_client::application::chat_session::ChatSession;
use chat_client::infrastructure::network::{ServerConnection, DEFAULT_HANDSHAKE_TIMEOUT};
use chat_core::{hard_stop, spawn_line_reader, PendingInput, ShutdownSignal, DEFAULT_SERVER_PORT};

/// Sleep between session iterations.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time given to the close frame to reach the server before exit.
const CLOSE_GRACE: Duration = Duration::from_millis(200);

/// Terminal client for the chat relay.
#[derive(Debug, Parser)]
#[command(name = "chat-client", about = "Terminal client for the chat relay", version)]
struct Cli {
    /// Address of the chat server, as `host:port`.
    #[arg(long, env = "CHAT_SERVER_ADDR", default_value_t = default_server())]
    server: String,
}

fn default_server() -> String {
    format!("127.0.0.1:{DEFAULT_SERVER_PORT}")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let shutdown = ShutdownSignal::new();
    let input = PendingInput::new();

    let link = match ServerConnection::connect(&cli.server, DEFAULT_HANDSHAKE_TIMEOUT).await {
        Ok(link) => link,
        Err(e) => {
            error!("{e}");
            hard_stop(1);
        }
    };

    spawn_line_reader(
        BufReader::new(std::io::stdin()),
        input.clone(),
        shutdown.clone(),
    )
    .context("failed to start console reader")?;

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                ctrl_c_shutdown.trigger();
            }
            Err(e) => warn!("failed to listen for Ctrl-C: {e}"),
        }
    });

    let mut session = ChatSession::new(link, std::io::stdout(), input, shutdown);
    if let Err(e) = session.run(POLL_INTERVAL).await {
        error!("{e}");
        session.finish();
        tokio::time::sleep(CLOSE_GRACE).await;
        hard_stop(1);
    }

    tokio::time::sleep(CLOSE_GRACE).await;
    info!("disconnected");

    // The console reader may still be parked in a blocking read.
    hard_stop(0)
}
