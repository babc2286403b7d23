//! Listener registry.
//!
//! Wraps user handlers so that a call carrying [`RelayMeta`] is answered
//! with exactly one [`ReplyEnvelope`] on the reply channel: the handler's
//! value, its error, or `InvokeTimeout` when it overruns the caller's budget.
//! Raw listeners (`receive`) get the data with no reply and no timeout.

use crate::naming::ChannelNamer;
use crate::timeout::race_with_timeout;
use ipc_bus::{HubTransport, Listener, ListenerId, PeerTransport};
use ipc_types::{
    from_payload, to_payload, ConnectionId, IpcError, IpcResult, Payload, PeerMessage, RelayMeta,
    ReplyEnvelope, RequestId,
};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// What a handler knows about the message it is processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Connection the message arrived from (the hub, on a peer).
    pub sender: ConnectionId,
    /// Present when the message is part of a call that expects a reply.
    pub meta: Option<RelayMeta>,
}

impl CallContext {
    pub fn new(sender: ConnectionId, meta: Option<RelayMeta>) -> Self {
        Self { sender, meta }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.meta.as_ref().map(|m| &m.request_id)
    }

    /// The connection that originated the call.
    ///
    /// For relayed calls this is the calling peer, not the hub.
    pub fn caller_id(&self) -> ConnectionId {
        self.meta.as_ref().map_or(self.sender, |m| m.caller_id)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.meta.as_ref().and_then(RelayMeta::timeout)
    }
}

/// Where a registration lives, for removing it later.
#[derive(Clone)]
pub(crate) enum Registration {
    PeerListener(Weak<dyn PeerTransport>),
    HubListener(Weak<dyn HubTransport>),
    HubHandler(Weak<dyn HubTransport>),
}

impl Registration {
    fn remove(&self, channel: &str, id: ListenerId) -> bool {
        match self {
            Self::PeerListener(transport) => transport
                .upgrade()
                .is_some_and(|t| t.remove_listener(channel, id)),
            Self::HubListener(transport) => transport
                .upgrade()
                .is_some_and(|t| t.remove_listener(channel, id)),
            Self::HubHandler(transport) => transport
                .upgrade()
                .is_some_and(|t| t.remove_handler(channel, id)),
        }
    }
}

/// Unsubscribe capability returned by every registration.
///
/// Dropping the handle leaves the registration in place.
pub struct ListenerHandle {
    channel: String,
    id: ListenerId,
    registration: Registration,
}

impl ListenerHandle {
    pub(crate) fn new(channel: String, id: ListenerId, registration: Registration) -> Self {
        Self {
            channel,
            id,
            registration,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove the registration. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let removed = self.registration.remove(&self.channel, self.id);
        debug!(channel = %self.channel, removed, "Unsubscribed");
        removed
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

/// Fire-once guard for `*_once` registrations.
///
/// The first message claims the slot and removes the registration. A message
/// that races ahead of `bind` still claims it; `bind` then does the removal.
pub(crate) struct OnceSlot {
    fired: AtomicBool,
    id: OnceLock<ListenerId>,
    channel: String,
    registration: Registration,
}

impl OnceSlot {
    pub(crate) fn new(channel: String, registration: Registration) -> Arc<Self> {
        Arc::new(Self {
            fired: AtomicBool::new(false),
            id: OnceLock::new(),
            channel,
            registration,
        })
    }

    /// True for the first caller only.
    pub(crate) fn claim(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(id) = self.id.get() {
            self.registration.remove(&self.channel, *id);
        }
        true
    }

    pub(crate) fn bind(&self, id: ListenerId) {
        let _ = self.id.set(id);
        if self.fired.load(Ordering::Acquire) {
            self.registration.remove(&self.channel, id);
        }
    }
}

/// Handlers and raw listeners for one peer.
pub struct ListenerRegistry {
    transport: Arc<dyn PeerTransport>,
    namer: ChannelNamer,
}

impl ListenerRegistry {
    pub fn new(transport: Arc<dyn PeerTransport>, namer: ChannelNamer) -> Self {
        Self { transport, namer }
    }

    /// Answer calls to `operation` with `handler`.
    pub fn handle<F, Fut>(&self, operation: &str, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        self.install(operation, false, |channel, slot| {
            self.handler_listener(channel, handler, slot)
        })
    }

    /// Like [`handle`](Self::handle), removed after the first message.
    pub fn handle_once<F, Fut>(&self, operation: &str, handler: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        self.install(operation, true, |channel, slot| {
            self.handler_listener(channel, handler, slot)
        })
    }

    /// Raw listener: no reply is sent and no timeout applies.
    pub fn receive<F>(&self, operation: &str, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        self.install(operation, false, |channel, slot| {
            raw_listener(channel, listener, slot)
        })
    }

    pub fn receive_once<F>(&self, operation: &str, listener: F) -> ListenerHandle
    where
        F: Fn(CallContext, Payload) + Send + Sync + 'static,
    {
        self.install(operation, true, |channel, slot| {
            raw_listener(channel, listener, slot)
        })
    }

    fn install(
        &self,
        operation: &str,
        once: bool,
        make: impl FnOnce(String, Option<Arc<OnceSlot>>) -> Listener,
    ) -> ListenerHandle {
        let channel = self.namer.wrap_channel(operation);
        let registration = Registration::PeerListener(Arc::downgrade(&self.transport));
        let slot = once.then(|| OnceSlot::new(channel.clone(), registration.clone()));

        let id = self.transport.on(&channel, make(channel.clone(), slot.clone()));
        if let Some(slot) = slot {
            slot.bind(id);
        }
        debug!(channel = %channel, once, "Registered peer listener");
        ListenerHandle::new(channel, id, registration)
    }

    fn handler_listener<F, Fut>(
        &self,
        channel: String,
        handler: F,
        slot: Option<Arc<OnceSlot>>,
    ) -> Listener
    where
        F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IpcResult<Payload>> + Send + 'static,
    {
        let transport = Arc::downgrade(&self.transport);
        let reply_channel = self.namer.reply_to();
        let handler = Arc::new(handler);

        Arc::new(move |sender: ConnectionId, raw: Payload| {
            if slot.as_ref().is_some_and(|s| !s.claim()) {
                return;
            }
            let PeerMessage { meta, data } = match from_payload(raw) {
                Ok(message) => message,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Dropping undecodable message");
                    return;
                }
            };

            // Called inside the raced task so a panic before the future exists still replies.
            let handler = handler.clone();
            let context = CallContext::new(sender, meta.clone());
            let work = async move { handler(context, data).await };
            let transport = transport.clone();
            let channel = channel.clone();
            let reply_channel = reply_channel.clone();

            tokio::spawn(async move {
                let timeout = meta.as_ref().and_then(RelayMeta::timeout);
                let timeout_channel = channel.clone();
                let result = race_with_timeout(work, timeout, move || IpcError::InvokeTimeout {
                    channel: timeout_channel,
                })
                .await;

                let Some(meta) = meta else {
                    if let Err(e) = result {
                        warn!(channel = %channel, error = %e, "Notification handler failed");
                    }
                    return;
                };
                let Some(transport) = transport.upgrade() else {
                    return;
                };
                let reply = ReplyEnvelope::from_result(meta.request_id, result);
                send_reply(transport.as_ref(), &reply_channel, reply).await;
            });
        })
    }
}

fn raw_listener<F>(channel: String, listener: F, slot: Option<Arc<OnceSlot>>) -> Listener
where
    F: Fn(CallContext, Payload) + Send + Sync + 'static,
{
    Arc::new(move |sender: ConnectionId, raw: Payload| {
        if slot.as_ref().is_some_and(|s| !s.claim()) {
            return;
        }
        match from_payload::<PeerMessage>(raw) {
            Ok(PeerMessage { meta, data }) => listener(CallContext::new(sender, meta), data),
            Err(e) => warn!(channel = %channel, error = %e, "Dropping undecodable message"),
        }
    })
}

async fn send_reply(transport: &dyn PeerTransport, channel: &str, reply: ReplyEnvelope) {
    let request_id = reply.request_id.clone();
    let sent = match to_payload(&reply) {
        Ok(payload) => transport.send(channel, payload).await,
        Err(e) => Err(e),
    };
    match sent {
        Ok(()) => debug!(request_id = %request_id, "Sent reply"),
        Err(e) => warn!(request_id = %request_id, error = %e, "Failed to send reply"),
    }
}
