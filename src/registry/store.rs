//! Connection registry implementation

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::sink::{BoxedWriter, Sink, SinkId};

/// Set of live connection sinks
///
/// Thread-safe via `RwLock`; callers never lock externally. Registration,
/// removal and iteration may run concurrently from any number of tasks.
pub struct ConnectionRegistry {
    sinks: RwLock<HashMap<SinkId, Arc<Sink>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a sink for `io` without registering it yet
    pub fn create_sink(&self, peer_addr: Option<SocketAddr>, io: BoxedWriter) -> Arc<Sink> {
        let id = SinkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Arc::new(Sink::new(id, peer_addr, io))
    }

    /// Add a sink to the broadcast set
    pub async fn register(&self, sink: Arc<Sink>) {
        let id = sink.id();
        let mut sinks = self.sinks.write().await;
        sinks.insert(id, sink);

        tracing::debug!(sink = %id, members = sinks.len(), "Sink registered");
    }

    /// Remove a sink from the broadcast set
    ///
    /// The sink is marked closed before removal so an iteration that already
    /// holds it skips it. Returns the sink if it was registered.
    pub async fn unregister(&self, id: SinkId) -> Option<Arc<Sink>> {
        let mut sinks = self.sinks.write().await;
        let removed = sinks.remove(&id);

        if let Some(ref sink) = removed {
            sink.close();
            tracing::debug!(sink = %id, members = sinks.len(), "Sink unregistered");
        }

        removed
    }

    /// Weakly-consistent copy of the current members
    ///
    /// Sinks registered after this returns are not included; sinks removed
    /// afterwards report themselves closed.
    pub async fn members(&self) -> Vec<Arc<Sink>> {
        self.sinks.read().await.values().cloned().collect()
    }

    /// Apply `f` to every current member
    pub async fn for_each<F, Fut>(&self, mut f: F)
    where
        F: FnMut(Arc<Sink>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        for sink in self.members().await {
            if sink.is_closed() {
                continue;
            }
            f(sink).await;
        }
    }

    /// Whether a sink is currently registered
    pub async fn contains(&self, id: SinkId) -> bool {
        self.sinks.read().await.contains_key(&id)
    }

    /// Number of registered sinks
    pub async fn len(&self) -> usize {
        self.sinks.read().await.len()
    }

    /// Whether no sinks are registered
    pub async fn is_empty(&self) -> bool {
        self.sinks.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
