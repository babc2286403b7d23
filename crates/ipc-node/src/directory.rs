//! Name-based peer directory.
//!
//! Backs the hub's target resolver: a relayed call addressed by name (`"sub"`
//! or `{"name": "sub"}`) resolves to whichever connection registered it.

use ipc_types::{ConnectionId, Payload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    names: Arc<RwLock<HashMap<String, ConnectionId>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `id`, replacing any previous binding.
    pub fn register(&self, name: impl Into<String>, id: ConnectionId) {
        let name = name.into();
        debug!(name = %name, connection = %id, "Registered peer name");
        self.names.write().insert(name, id);
    }

    pub fn unregister(&self, name: &str) -> Option<ConnectionId> {
        self.names.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<ConnectionId> {
        self.names.read().get(name).copied()
    }

    /// Resolve relay lookup arguments.
    pub fn resolve(&self, args: &Payload) -> Option<ConnectionId> {
        let name = args
            .as_str()
            .or_else(|| args.get("name").and_then(Payload::as_str))?;
        self.get(name)
    }
}
