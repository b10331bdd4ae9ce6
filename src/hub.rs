//! Message fan-out to connected realtime clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Outbound buffer size per client. A client that lets this fill up is
/// dropped rather than allowed to stall the broadcaster.
pub const CLIENT_BUFFER: usize = 32;

pub type ClientId = u64;

/// Handed back by [`BroadcastHub::register`]: the client's id plus the
/// receiving end of its outbound buffer.
pub struct Subscription {
    pub id: ClientId,
    pub rx: mpsc::Receiver<Arc<str>>,
}

/// Tracks connected realtime clients and delivers messages to all of them.
///
/// Each client has an independent bounded outbound channel; delivery to one
/// client never blocks delivery to the others. A full or closed channel
/// unregisters the offending client within the same broadcast.
pub struct BroadcastHub {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
    active_count: AtomicUsize,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a client to the active set.
    pub async fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let mut clients = self.clients.write().await;
        if clients.insert(id, tx).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        debug!(client_id = id, "realtime client registered");
        Subscription { id, rx }
    }

    /// Remove a client. Removing an already-removed client is a no-op.
    pub async fn unregister(&self, id: ClientId) {
        let mut clients = self.clients.write().await;
        if clients.remove(&id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            debug!(client_id = id, "realtime client unregistered");
        }
    }

    /// Deliver `message` to every client connected at the moment of the call.
    /// Returns the number of clients the message was handed to.
    ///
    /// Messages submitted sequentially by one caller arrive at each client in
    /// submission order: the fan-out below pushes into per-client FIFO
    /// channels without awaiting in between.
    pub async fn broadcast(&self, message: impl Into<String>) -> usize {
        let payload: Arc<str> = Arc::from(message.into());
        let mut delivered = 0usize;
        let mut to_remove = Vec::new();
        {
            let clients = self.clients.read().await;
            for (id, tx) in clients.iter() {
                match tx.try_send(Arc::clone(&payload)) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(client_id = id, error = %e, "dropping slow or closed client");
                        to_remove.push(*id);
                    }
                }
            }
            debug!(recipients = delivered, "broadcast message");
        }
        if !to_remove.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &to_remove {
                if clients.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
        delivered
    }

    /// Number of active clients.
    pub fn client_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
