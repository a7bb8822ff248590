//! Chat server listener
//!
//! Handles TCP accept loop and spawns connection workers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::connection::Connection;
use super::hub::BroadcastHub;
use crate::codec::{Cipher, WireFramer};
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::registry::ConnectionRegistry;
use crate::server::config::ServerConfig;
use crate::stats::StatsSnapshot;

/// Chat relay server
///
/// Startup is all-or-nothing: [`bind`](Self::bind) fails if either the
/// history log cannot be opened or the listening socket cannot be bound, and
/// no connection is accepted before both succeed.
pub struct ChatServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl ChatServer {
    /// Open the history log and bind the listening socket
    pub async fn bind(config: ServerConfig, cipher: Arc<dyn Cipher>) -> Result<Self> {
        let history = HistoryStore::open(&config.history_path).await?;

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let hub = BroadcastHub::new(
            Arc::new(history),
            Arc::new(ConnectionRegistry::new()),
            WireFramer::new(cipher),
        );

        Ok(Self {
            config,
            listener,
            local_addr,
            hub: Arc::new(hub),
            connection_semaphore,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared hub (history, registry, framer)
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Current counters
    pub fn stats(&self) -> StatsSnapshot {
        self.hub.stats_snapshot()
    }

    /// Run the server
    ///
    /// This method blocks until the process exits.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr,
            history = %self.config.history_path.display(),
            "Chat relay listening"
        );

        self.accept_loop().await
    }

    /// Run the server with graceful shutdown
    ///
    /// Stops accepting when `shutdown` resolves; connections already being
    /// served keep running on their own tasks.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(
            addr = %self.local_addr,
            history = %self.config.history_path.display(),
            "Chat relay listening"
        );

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop() => result,
        }
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit: Option<OwnedSemaphorePermit> = match self.connection_semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.hub.stats().connection_rejected();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
                return;
            }
        }

        let hub = Arc::clone(&self.hub);
        let max_frame_length = self.config.max_frame_length;

        tokio::spawn(async move {
            let _permit = permit;
            let (read_half, write_half) = socket.into_split();
            let mut connection = Connection::new(
                Arc::clone(&hub),
                Some(peer_addr),
                read_half,
                Box::new(write_half),
                max_frame_length,
            );
            let sink = connection.sink_id();

            hub.stats().connection_opened();
            tracing::debug!(sink = %sink, peer = %peer_addr, "New connection");

            if let Err(e) = connection.run().await {
                tracing::debug!(sink = %sink, peer = %peer_addr, error = %e, "Connection error");
            }

            hub.stats().connection_closed();
            tracing::debug!(sink = %sink, peer = %peer_addr, "Connection closed");
        });
    }
}

/// Turn a signal listener into a shutdown future for [`ChatServer::run_until`]
///
/// If the listener fails (for example the handler cannot be installed) the
/// error is logged and the returned future never resolves, so the server
/// keeps running instead of stopping right after startup.
pub async fn shutdown_signal<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal, running until killed");
        std::future::pending::<()>().await;
    }
}
