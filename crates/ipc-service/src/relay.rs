//! Hub relay engine.
//!
//! Serves the three internal channels:
//!
//! | Channel | Kind | Effect |
//! |---------|------|--------|
//! | `forward-to-peer` | request/ack | track the call, deliver it to the target, ack with its outcome |
//! | `reply-to` | fire-and-forget | settle the tracked call by request id |
//! | `send-to` | fire-and-forget | deliver a notification to the target, no tracking |
//!
//! The caller-generated request id is the only correlation key.

use crate::config::ServiceConfig;
use crate::naming::ChannelNamer;
use crate::pending::PendingRequestTable;
use crate::registry::{ListenerHandle, Registration};
use crate::request::millis;
use futures::FutureExt;
use ipc_bus::{HubTransport, InvokeHandler, Listener};
use ipc_telemetry::{metric_inc, RELAYS_FORWARDED, RELAYS_SENT, REQUESTS_ISSUED};
use ipc_types::{
    from_payload, to_payload, ConnectionId, IpcError, IpcResult, Payload, PeerMessage,
    RelayEnvelope, ReplyEnvelope, Target,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct RelayEngine {
    transport: Arc<dyn HubTransport>,
    config: ServiceConfig,
    namer: ChannelNamer,
    pending: Arc<PendingRequestTable>,
}

impl RelayEngine {
    pub fn new(
        transport: Arc<dyn HubTransport>,
        config: ServiceConfig,
        pending: Arc<PendingRequestTable>,
    ) -> Self {
        let namer = ChannelNamer::new(config.channel_prefix.clone());
        Self {
            transport,
            config,
            namer,
            pending,
        }
    }

    /// Register the internal channel handlers on the transport.
    pub fn install(self: &Arc<Self>) -> Vec<ListenerHandle> {
        let weak = Arc::downgrade(self);
        let transport = Arc::downgrade(&self.transport);

        let forward_channel = self.namer.forward_to_peer();
        let forward_id = self
            .transport
            .handle(&forward_channel, forward_handler(weak.clone()));

        let reply_channel = self.namer.reply_to();
        let reply_id = self.transport.on(&reply_channel, reply_listener(weak.clone()));

        let send_to_channel = self.namer.send_to();
        let send_to_id = self.transport.on(&send_to_channel, send_to_listener(weak));

        debug!(prefix = %self.namer.prefix(), "Relay engine installed");

        vec![
            ListenerHandle::new(
                forward_channel,
                forward_id,
                Registration::HubHandler(transport.clone()),
            ),
            ListenerHandle::new(
                reply_channel,
                reply_id,
                Registration::HubListener(transport.clone()),
            ),
            ListenerHandle::new(
                send_to_channel,
                send_to_id,
                Registration::HubListener(transport),
            ),
        ]
    }

    /// Handle a `forward-to-peer` request from `sender`.
    pub async fn forward(&self, sender: ConnectionId, payload: Payload) -> IpcResult<Payload> {
        let mut envelope: RelayEnvelope = from_payload(payload)?;
        // The transport knows who sent it; the envelope's claim is not trusted.
        envelope.caller_id = sender;
        metric_inc!(REQUESTS_ISSUED, &["hub", "relay"]);
        self.relay_call(envelope).await
    }

    /// Track `envelope` in the hub table, deliver it, and wait for the
    /// outcome: the target's reply, a relay failure, the timeout, or
    /// shutdown.
    pub async fn relay_call(&self, envelope: RelayEnvelope) -> IpcResult<Payload> {
        let timeout = self
            .config
            .effective_timeout(envelope.timeout_ms.map(Duration::from_millis));
        let request_id = envelope.request_id.clone();
        let receiver = self
            .pending
            .register(request_id.clone(), &envelope.channel, timeout);

        if let Err(error) = self.deliver(&envelope, timeout).await {
            warn!(
                request_id = %request_id,
                channel = %envelope.channel,
                error = %error,
                "Relay failed"
            );
            self.pending.reject(&request_id, Some(error));
        }

        receiver
            .await
            .unwrap_or_else(|_| Err(IpcError::RequestRejected { request_id }))
    }

    /// Explicit id first, then the configured resolver.
    pub fn resolve_target(&self, target: &Target) -> IpcResult<ConnectionId> {
        if let Some(id) = target.id {
            return Ok(id);
        }
        let resolved = match (&target.lookup, &self.config.resolve_target) {
            (Some(args), Some(resolver)) => resolver(args),
            _ => None,
        };
        resolved.ok_or(IpcError::TargetUnresolved)
    }

    /// Handle a `reply-to` message. Unknown or already settled ids are ignored.
    pub fn on_reply(&self, sender: ConnectionId, payload: Payload) {
        let reply: ReplyEnvelope = match from_payload(payload) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(sender = %sender, error = %e, "Dropping undecodable reply");
                return;
            }
        };
        let request_id = reply.request_id.clone();
        match reply.into_result() {
            Ok(value) => self.pending.resolve(&request_id, value),
            Err(error) => self.pending.reject(&request_id, Some(error)),
        };
    }

    /// Handle a `send-to` message.
    pub async fn on_send_to(&self, sender: ConnectionId, payload: Payload) -> IpcResult<()> {
        let envelope: RelayEnvelope = from_payload(payload)?;
        let target = self.resolve_target(&envelope.target)?;
        let connection = self
            .transport
            .connection(target)
            .ok_or(IpcError::ConnectionNotFound { id: target })?;

        let message = PeerMessage::notification(envelope.data);
        connection
            .send(&envelope.channel, to_payload(&message)?)
            .await?;

        metric_inc!(RELAYS_SENT);
        debug!(
            sender = %sender,
            target = %target,
            channel = %envelope.channel,
            "Relayed notification"
        );
        Ok(())
    }

    async fn deliver(&self, envelope: &RelayEnvelope, timeout: Option<Duration>) -> IpcResult<()> {
        let target = self.resolve_target(&envelope.target)?;
        let connection = self
            .transport
            .connection(target)
            .ok_or(IpcError::ConnectionNotFound { id: target })?;

        let meta = envelope.meta(timeout.map(millis));
        let message = PeerMessage::call(meta, envelope.data.clone());
        connection
            .send(&envelope.channel, to_payload(&message)?)
            .await?;

        metric_inc!(RELAYS_FORWARDED);
        debug!(
            request_id = %envelope.request_id,
            caller = %envelope.caller_id,
            target = %target,
            channel = %envelope.channel,
            "Forwarded call"
        );
        Ok(())
    }
}

fn forward_handler(engine: Weak<RelayEngine>) -> InvokeHandler {
    Arc::new(move |sender: ConnectionId, payload: Payload| {
        let engine = engine.clone();
        async move {
            match engine.upgrade() {
                Some(engine) => engine.forward(sender, payload).await,
                None => Err(IpcError::transport("relay engine stopped")),
            }
        }
        .boxed()
    })
}

fn reply_listener(engine: Weak<RelayEngine>) -> Listener {
    Arc::new(move |sender: ConnectionId, payload: Payload| {
        if let Some(engine) = engine.upgrade() {
            engine.on_reply(sender, payload);
        }
    })
}

fn send_to_listener(engine: Weak<RelayEngine>) -> Listener {
    Arc::new(move |sender: ConnectionId, payload: Payload| {
        let Some(engine) = engine.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            // No one is waiting on a notification; failures end here.
            if let Err(e) = engine.on_send_to(sender, payload).await {
                error!(sender = %sender, error = %e, "Notification relay failed");
            }
        });
    })
}
