//! Peer service.
//!
//! Any number per system. Calls the hub directly, calls other peers through
//! the hub's relay, and answers calls with handlers from its
//! [`ListenerRegistry`].

use crate::config::{ConfigError, ServiceConfig};
use crate::naming::ChannelNamer;
use crate::pending::{PendingRequestTable, PendingStats};
use crate::registry::{CallContext, ListenerHandle, ListenerRegistry};
use crate::request::Request;
use crate::timeout::race_with_timeout;
use ipc_bus::PeerTransport;
use ipc_telemetry::{metric_inc, REQUESTS_ISSUED};
use ipc_types::{
    to_payload, ConnectionId, IpcError, IpcResult, Payload, RelayEnvelope, RequestId,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PeerService {
    transport: Arc<dyn PeerTransport>,
    config: ServiceConfig,
    namer: ChannelNamer,
    pending: Arc<PendingRequestTable>,
    listeners: ListenerRegistry,
}

impl PeerService {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        config: ServiceConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let namer = ChannelNamer::new(config.channel_prefix.clone());
        let listeners = ListenerRegistry::new(transport.clone(), namer.clone());
        info!(
            connection = %transport.id(),
            prefix = %config.channel_prefix,
            "Peer service started"
        );

        Ok(Self {
            transport,
            config,
            namer,
            pending: Arc::new(PendingRequestTable::new("peer")),
            listeners,
        })
    }

    /// This peer's connection id.
    pub fn id(&self) -> ConnectionId {
        self.transport.id()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn namer(&self) -> &ChannelNamer {
        &self.namer
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Call a hub handler directly.
    ///
    /// Fails with `InvokeTimeout` if no result arrives within the timeout.
    /// The call itself is not cancelled; a late result is discarded.
    pub async fn invoke(&self, operation: &str, request: Request) -> IpcResult<Payload> {
        metric_inc!(REQUESTS_ISSUED, &["peer", "invoke"]);
        let channel = self.namer.wrap_channel(operation);
        let timeout = self.config.effective_timeout(request.timeout);
        debug!(channel = %channel, timeout_ms = ?timeout.map(|t| t.as_millis()), "Invoking hub");

        let transport = self.transport.clone();
        let call_channel = channel.clone();
        let data = request.data;
        race_with_timeout(
            async move { transport.invoke(&call_channel, data).await },
            timeout,
            move || IpcError::InvokeTimeout { channel },
        )
        .await
    }

    /// Call a handler on another peer through the hub.
    ///
    /// The target comes from `request.target`. Without an id or lookup
    /// arguments the call fails with `TargetUnresolved` before anything is
    /// sent. The hub enforces the timeout.
    pub async fn invoke_to(&self, operation: &str, request: Request) -> IpcResult<Payload> {
        if !request.target.is_addressable() {
            return Err(IpcError::TargetUnresolved);
        }
        metric_inc!(REQUESTS_ISSUED, &["peer", "invoke_to"]);

        let envelope = self.envelope(operation, request);
        let request_id = envelope.request_id.clone();
        let payload = to_payload(&envelope)?;
        let receiver = self
            .pending
            .register(request_id.clone(), &envelope.channel, None);

        let transport = self.transport.clone();
        let pending = self.pending.clone();
        let forward_channel = self.namer.forward_to_peer();
        let ack_id = request_id.clone();
        tokio::spawn(async move {
            match transport.invoke(&forward_channel, payload).await {
                Ok(value) => pending.resolve(&ack_id, value),
                Err(error) => pending.reject(&ack_id, Some(error)),
            };
        });

        debug!(request_id = %request_id, channel = %envelope.channel, "Relayed call issued");
        receiver
            .await
            .unwrap_or_else(|_| Err(IpcError::RequestRejected { request_id }))
    }

    /// Fire-and-forget message to another peer through the hub.
    ///
    /// Delivery failures at the hub are not reported back.
    pub async fn send_to(&self, operation: &str, request: Request) -> IpcResult<()> {
        if !request.target.is_addressable() {
            return Err(IpcError::TargetUnresolved);
        }
        let envelope = self.envelope(operation, request);
        self.transport
            .send(&self.namer.send_to(), to_payload(&envelope)?)
            .await
    }

    /// Fire-and-forget message to the hub.
    pub async fn send(&self, operation: &str, data: Payload) -> IpcResult<()> {
        self.transport
            .send(&self.namer.wrap_channel(operation), data)
            .await
    }

    pub fn handle<F, Fut>(&self, operation: &str, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        self.listeners.handle(operation, handler)
    }

    pub fn handle_once<F, Fut>(&self, operation: &str, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        self.listeners.handle_once(operation, handler)
    }

    pub fn receive<F>(&self, operation: &str, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        self.listeners.receive(operation, listener)
    }

    pub fn receive_once<F>(&self, operation: &str, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        self.listeners.receive_once(operation, listener)
    }

    /// Relayed calls this peer is still waiting on.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &PendingStats {
        self.pending.stats()
    }

    /// Reject every relayed call in flight. Returns how many were dropped.
    pub fn destroy(&self) -> usize {
        let dropped = self.pending.drop_all();
        info!(connection = %self.id(), dropped, "Peer service destroyed pending requests");
        dropped
    }

    fn envelope(&self, operation: &str, request: Request) -> RelayEnvelope {
        RelayEnvelope {
            request_id: RequestId::new(),
            channel: self.namer.wrap_channel(operation),
            caller_id: self.id(),
            timeout_ms: request.timeout_ms(),
            target: request.target,
            data: request.data,
        }
    }
}
