//! Hub service.
//!
//! One per system. Owns the relay engine and the hub's pending table, serves
//! direct calls from peers, and can call or notify peers itself.

use crate::config::{ConfigError, ServiceConfig};
use crate::naming::ChannelNamer;
use crate::pending::{PendingRequestTable, PendingStats};
use crate::registry::{CallContext, ListenerHandle, OnceSlot, Registration};
use crate::relay::RelayEngine;
use crate::request::Request;
use crate::timeout::run_isolated;
use futures::FutureExt;
use ipc_bus::{HubTransport, InvokeHandler, Listener};
use ipc_telemetry::{metric_inc, REQUESTS_ISSUED};
use ipc_types::{
    to_payload, ConnectionId, IpcError, IpcResult, Payload, PeerMessage, RelayEnvelope, RequestId,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub struct HubService {
    transport: Arc<dyn HubTransport>,
    config: ServiceConfig,
    namer: ChannelNamer,
    pending: Arc<PendingRequestTable>,
    relay: Arc<RelayEngine>,
    relay_handles: Vec<ListenerHandle>,
}

impl HubService {
    /// Create the hub service and install the relay engine on `transport`.
    pub fn new(
        transport: Arc<dyn HubTransport>,
        config: ServiceConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let namer = ChannelNamer::new(config.channel_prefix.clone());
        let pending = Arc::new(PendingRequestTable::new("hub"));
        let relay = Arc::new(RelayEngine::new(
            transport.clone(),
            config.clone(),
            pending.clone(),
        ));
        let relay_handles = relay.install();

        info!(
            prefix = %config.channel_prefix,
            default_timeout_ms = config.default_timeout_ms,
            resolver = config.resolve_target.is_some(),
            "Hub service started"
        );

        Ok(Self {
            transport,
            config,
            namer,
            pending,
            relay,
            relay_handles,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn namer(&self) -> &ChannelNamer {
        &self.namer
    }

    /// Answer direct calls to `operation` from any peer.
    ///
    /// The handler's value or error is the peer's result. A channel has one
    /// handler; registering again replaces it.
    pub fn handle<F, Fut>(&self, operation: &str, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        self.install_handler(operation, false, handler)
    }

    /// Like [`handle`](Self::handle), removed after the first call.
    pub fn handle_once<F, Fut>(&self, operation: &str, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        self.install_handler(operation, true, handler)
    }

    /// Raw listener for fire-and-forget messages from peers.
    pub fn receive<F>(&self, operation: &str, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        self.install_listener(operation, false, listener)
    }

    pub fn receive_once<F>(&self, operation: &str, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        self.install_listener(operation, true, listener)
    }

    /// Call `operation` on the peer named by `request.target`.
    ///
    /// Goes through the relay path with the hub as caller, so the peer
    /// handler sees the same metadata as for a peer-to-peer call.
    pub async fn invoke_peer(&self, operation: &str, request: Request) -> IpcResult<Payload> {
        metric_inc!(REQUESTS_ISSUED, &["hub", "invoke_peer"]);
        let envelope = RelayEnvelope {
            request_id: RequestId::new(),
            channel: self.namer.wrap_channel(operation),
            caller_id: ConnectionId::HUB,
            timeout_ms: request.timeout_ms(),
            target: request.target,
            data: request.data,
        };
        self.relay.relay_call(envelope).await
    }

    /// Fire-and-forget message to one peer.
    pub async fn send(&self, target: ConnectionId, operation: &str, data: Payload) -> IpcResult<()> {
        let connection = self
            .transport
            .connection(target)
            .ok_or(IpcError::ConnectionNotFound { id: target })?;
        let message = PeerMessage::notification(data);
        connection
            .send(&self.namer.wrap_channel(operation), to_payload(&message)?)
            .await
    }

    /// Relayed calls still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &PendingStats {
        self.pending.stats()
    }

    /// Reject every relayed call in flight. Returns how many were dropped.
    pub fn destroy(&self) -> usize {
        let dropped = self.pending.drop_all();
        info!(dropped, "Hub service destroyed pending requests");
        dropped
    }

    fn install_handler<F, Fut>(&self, operation: &str, once: bool, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        let channel = self.namer.wrap_channel(operation);
        let registration = Registration::HubHandler(Arc::downgrade(&self.transport));
        let slot = once.then(|| OnceSlot::new(channel.clone(), registration.clone()));

        let handler = Arc::new(handler);
        let invoke: InvokeHandler = {
            let slot = slot.clone();
            let channel = channel.clone();
            Arc::new(move |sender: ConnectionId, payload: Payload| {
                if slot.as_ref().is_some_and(|s| !s.claim()) {
                    let missing = IpcError::transport(format!("no handler registered for '{channel}'"));
                    return async move { Err::<Payload, _>(missing) }.boxed();
                }
                let handler = handler.clone();
                let context = CallContext::new(sender, None);
                run_isolated(async move { handler(context, payload).await }).boxed()
            })
        };

        let id = self.transport.handle(&channel, invoke);
        if let Some(slot) = slot {
            slot.bind(id);
        }
        debug!(channel = %channel, once, "Registered hub handler");
        ListenerHandle::new(channel, id, registration)
    }

    fn install_listener<F>(&self, operation: &str, once: bool, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        let channel = self.namer.wrap_channel(operation);
        let registration = Registration::HubListener(Arc::downgrade(&self.transport));
        let slot = once.then(|| OnceSlot::new(channel.clone(), registration.clone()));

        let raw: Listener = {
            let slot = slot.clone();
            Arc::new(move |sender: ConnectionId, payload: Payload| {
                if slot.as_ref().is_some_and(|s| !s.claim()) {
                    return;
                }
                listener(CallContext::new(sender, None), payload);
            })
        };

        let id = self.transport.on(&channel, raw);
        if let Some(slot) = slot {
            slot.bind(id);
        }
        debug!(channel = %channel, once, "Registered hub listener");
        ListenerHandle::new(channel, id, registration)
    }
}

impl Drop for HubService {
    fn drop(&mut self) {
        for handle in &self.relay_handles {
            handle.unsubscribe();
        }
        self.pending.drop_all();
    }
}
