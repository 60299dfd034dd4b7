//! Chat relay server entry point.
//!
//! Wires the TCP transport, the console reader, and the Ctrl-C handler to the
//! [`ChatServer`] event loop.
//!
//! # Usage
//!
//! ```text
//! chat-server [OPTIONS]
//!
//! Options:
//!   --port   <PORT>  TCP port to listen on [env: CHAT_RELAY_PORT] [default: 27020]
//!   --bind   <ADDR>  IP address to bind to [env: CHAT_RELAY_BIND] [default: 0.0.0.0]
//!   --config <PATH>  Config file [default: <platform config dir>/chat-relay/server.toml]
//! ```
//!
//! Command-line flags override the config file.  Type `/quit` (or press
//! Ctrl-C) to shut the server down.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load config, init tracing
//!  ├─ console reader thread  (stdin ──► PendingInput)
//!  ├─ Ctrl-C task            (──► ShutdownSignal)
//!  └─ ChatServer::run()      (10 ms poll loop, then shutdown sequence)
//!       └─ grace delay, transport shutdown, hard stop
//! ```

use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use chat_core::{hard_stop, spawn_line_reader, PendingInput, ShutdownSignal};
use chat_server::application::server::ChatServer;
use chat_server::infrastructure::logging::init_tracing;
use chat_server::infrastructure::storage::config::{
    load_config, load_config_from, ConfigError, ServerConfig,
};
use chat_server::infrastructure::transport::TcpTransport;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-client chat relay server.
///
/// Every line a client sends is forwarded to every other connected client.
#[derive(Debug, Parser)]
#[command(name = "chat-server", about = "Multi-client chat relay server", version)]
struct Cli {
    /// TCP port to listen on.  Overrides `server.port` from the config file.
    #[arg(long, env = "CHAT_RELAY_PORT")]
    port: Option<u16>,

    /// IP address to bind to.  Overrides `server.bind_address`.
    ///
    /// Use `0.0.0.0` to accept connections on every interface, or `127.0.0.1`
    /// to accept only local connections.
    #[arg(long, env = "CHAT_RELAY_BIND")]
    bind: Option<String>,

    /// Path to a TOML config file.  Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    fn resolve_config(&self) -> anyhow::Result<ServerConfig> {
        let loaded = match &self.config {
            Some(path) => load_config_from(path),
            None => match load_config() {
                Err(ConfigError::NoPlatformConfigDir) => Ok(ServerConfig::default()),
                other => other,
            },
        };
        let mut config = loaded.context("failed to load configuration")?;
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_tracing(&config.logging.level);
    let settings = config
        .settings()
        .context("invalid server configuration")?;

    // Shutdown signal shared by the event loop, the console reader, and Ctrl-C.
    let shutdown = ShutdownSignal::new();
    let input = PendingInput::new();

    // ── Console reader ────────────────────────────────────────────────────────
    spawn_line_reader(
        BufReader::new(std::io::stdin()),
        input.clone(),
        shutdown.clone(),
    )
    .context("failed to start console reader")?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
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

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut server = match ChatServer::start(TcpTransport::new(), settings, input, shutdown) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            hard_stop(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("{e}");
        hard_stop(1);
    }

    // Give lingering closes time to flush before the sockets go away.
    tokio::time::sleep(config.shutdown_grace()).await;
    server.transport().shutdown();
    info!("server stopped");

    // The console reader may still be parked in a blocking read.
    hard_stop(0)
}
