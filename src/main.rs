//! Chat relay entry point
//!
//! Opens the history log, binds the listener and serves until Ctrl-C. Either
//! startup failure exits with a non-zero status before any connection is
//! accepted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_relay::codec::{AesGcmCipher, SharedKey};
use chat_relay::server::config::{DEFAULT_HISTORY_PATH, DEFAULT_PORT};
use chat_relay::server::shutdown_signal;
use chat_relay::{ChatServer, ServerConfig};

/// Encrypted line-based chat relay
#[derive(Debug, Parser)]
#[command(name = "chat-relay", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    bind: SocketAddr,

    /// Append-only history log
    #[arg(long, default_value = DEFAULT_HISTORY_PATH)]
    history: PathBuf,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Pre-shared key: 32 characters or 64 hex digits
    #[arg(long, env = "CHAT_RELAY_KEY", hide_env_values = true)]
    key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let key = SharedKey::parse(&args.key).context("invalid --key")?;
    let config = ServerConfig::default()
        .bind(args.bind)
        .history_path(args.history)
        .max_connections(args.max_connections);

    let server = ChatServer::bind(config, Arc::new(AesGcmCipher::new(&key)))
        .await
        .context("failed to start chat relay")?;

    server
        .run_until(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    let stats = server.stats();
    tracing::info!(
        connections = stats.total_connections,
        messages = stats.messages_accepted,
        history_write_failures = stats.history_write_failures,
        "Chat relay stopped"
    );

    Ok(())
}
