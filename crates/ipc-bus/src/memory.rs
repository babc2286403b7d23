//! # In-Memory Transport
//!
//! A hub and any number of peers living in one process, connected by tokio
//! unbounded channels.
//!
//! Each direction of each connection is drained by its own pump task, so
//! messages on a connection are delivered in send order. Request/acknowledge
//! handlers run in spawned tasks and may complete out of order.
//!
//! [`InMemoryHub::connect`] spawns the pump tasks and therefore must be called
//! from within a tokio runtime.

use crate::transport::{
    Connection, HubTransport, InvokeHandler, Listener, ListenerId, ListenerTable, PeerTransport,
};
use async_trait::async_trait;
use ipc_types::{ConnectionId, IpcError, IpcResult, Payload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Message travelling from a peer to the hub.
enum HubBound {
    Send {
        channel: String,
        payload: Payload,
    },
    Invoke {
        channel: String,
        payload: Payload,
        reply: oneshot::Sender<IpcResult<Payload>>,
    },
}

/// Message travelling from the hub to a peer.
struct PeerBound {
    channel: String,
    payload: Payload,
}

struct HubShared {
    handlers: RwLock<HashMap<String, (ListenerId, InvokeHandler)>>,
    listeners: ListenerTable,
    connections: RwLock<HashMap<ConnectionId, Arc<PeerLink>>>,
    next_connection: AtomicU64,
    next_handler: AtomicU64,
    /// Messages delivered to peers.
    deliveries: Arc<AtomicU64>,
}

impl HubShared {
    fn deliver(&self, sender: ConnectionId, message: HubBound) {
        match message {
            HubBound::Send { channel, payload } => {
                let invoked = self.listeners.dispatch(&channel, sender, &payload);
                if invoked == 0 {
                    debug!(channel = %channel, sender = %sender, "No hub listener for message");
                }
            }
            HubBound::Invoke {
                channel,
                payload,
                reply,
            } => {
                let handler = self.handlers.read().get(&channel).map(|(_, h)| h.clone());
                let Some(handler) = handler else {
                    warn!(channel = %channel, sender = %sender, "No handler registered");
                    let _ = reply.send(Err(IpcError::transport(format!(
                        "no handler registered for '{}'",
                        channel
                    ))));
                    return;
                };
                tokio::spawn(async move {
                    // Caller may have stopped waiting.
                    let _ = reply.send(handler(sender, payload).await);
                });
            }
        }
    }
}

/// Hub end of the in-memory transport.
#[derive(Clone)]
pub struct InMemoryHub {
    shared: Arc<HubShared>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HubShared {
                handlers: RwLock::new(HashMap::new()),
                listeners: ListenerTable::new(),
                connections: RwLock::new(HashMap::new()),
                next_connection: AtomicU64::new(1),
                next_handler: AtomicU64::new(0),
                deliveries: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Open a new peer connection.
    pub fn connect(&self) -> InMemoryPeer {
        let id = ConnectionId::new(self.shared.next_connection.fetch_add(1, Ordering::Relaxed));
        let (hub_tx, mut hub_rx) = mpsc::unbounded_channel::<HubBound>();
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<PeerBound>();
        let listeners = Arc::new(ListenerTable::new());

        let shared = self.shared.clone();
        tokio::spawn(async move {
            while let Some(message) = hub_rx.recv().await {
                shared.deliver(id, message);
            }
            debug!(connection = %id, "Peer to hub pump stopped");
        });

        let peer_listeners = listeners.clone();
        tokio::spawn(async move {
            while let Some(PeerBound { channel, payload }) = peer_rx.recv().await {
                let invoked = peer_listeners.dispatch(&channel, ConnectionId::HUB, &payload);
                if invoked == 0 {
                    debug!(channel = %channel, connection = %id, "No peer listener for message");
                }
            }
            debug!(connection = %id, "Hub to peer pump stopped");
        });

        self.shared.connections.write().insert(
            id,
            Arc::new(PeerLink {
                id,
                sender: peer_tx,
                deliveries: self.shared.deliveries.clone(),
            }),
        );
        debug!(connection = %id, "Peer connected");

        InMemoryPeer {
            id,
            sender: hub_tx,
            listeners,
        }
    }

    /// Drop a connection. Later lookups of `id` fail.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.shared.connections.write().remove(&id).is_some();
        if removed {
            debug!(connection = %id, "Peer disconnected");
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.read().len()
    }

    /// Total messages the hub has pushed to peers.
    pub fn deliveries(&self) -> u64 {
        self.shared.deliveries.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HubTransport for InMemoryHub {
    fn handle(&self, channel: &str, handler: InvokeHandler) -> ListenerId {
        let id = ListenerId::new(self.shared.next_handler.fetch_add(1, Ordering::Relaxed));
        let previous = self
            .shared
            .handlers
            .write()
            .insert(channel.to_string(), (id, handler));
        if previous.is_some() {
            warn!(channel = %channel, "Replaced existing handler");
        }
        id
    }

    fn remove_handler(&self, channel: &str, id: ListenerId) -> bool {
        let mut handlers = self.shared.handlers.write();
        let matches = handlers
            .get(channel)
            .is_some_and(|(current, _)| *current == id);
        if matches {
            handlers.remove(channel);
        }
        matches
    }

    fn on(&self, channel: &str, listener: Listener) -> ListenerId {
        self.shared.listeners.add(channel, listener)
    }

    fn remove_listener(&self, channel: &str, id: ListenerId) -> bool {
        self.shared.listeners.remove(channel, id)
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.shared
            .connections
            .read()
            .get(&id)
            .map(|link| link.clone() as Arc<dyn Connection>)
    }
}

/// Hub-side handle for one peer.
struct PeerLink {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<PeerBound>,
    deliveries: Arc<AtomicU64>,
}

#[async_trait]
impl Connection for PeerLink {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, channel: &str, payload: Payload) -> IpcResult<()> {
        self.sender
            .send(PeerBound {
                channel: channel.to_string(),
                payload,
            })
            .map_err(|_| IpcError::transport(format!("connection {} closed", self.id)))?;
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Peer end of the in-memory transport.
pub struct InMemoryPeer {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<HubBound>,
    listeners: Arc<ListenerTable>,
}

#[async_trait]
impl PeerTransport for InMemoryPeer {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, channel: &str, payload: Payload) -> IpcResult<()> {
        self.sender
            .send(HubBound::Send {
                channel: channel.to_string(),
                payload,
            })
            .map_err(|_| IpcError::transport("hub closed"))
    }

    async fn invoke(&self, channel: &str, payload: Payload) -> IpcResult<Payload> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(HubBound::Invoke {
                channel: channel.to_string(),
                payload,
                reply,
            })
            .map_err(|_| IpcError::transport("hub closed"))?;
        response
            .await
            .map_err(|_| IpcError::transport("hub dropped the request"))?
    }

    fn on(&self, channel: &str, listener: Listener) -> ListenerId {
        self.listeners.add(channel, listener)
    }

    fn remove_listener(&self, channel: &str, id: ListenerId) -> bool {
        self.listeners.remove(channel, id)
    }
}
