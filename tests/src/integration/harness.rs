//! Test fixture: one hub and any number of named peers.

use async_trait::async_trait;
use ipc_bus::{InMemoryHub, InMemoryPeer, Listener, ListenerId, PeerTransport};
use ipc_node::PeerDirectory;
use ipc_service::{ChannelNamer, HubService, PeerService, ServiceConfig};
use ipc_types::{
    from_payload, to_payload, ConnectionId, IpcResult, Payload, PeerMessage, ReplyEnvelope,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any single await in the suite.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub hub: InMemoryHub,
    pub directory: PeerDirectory,
    pub service: HubService,
    pub config: ServiceConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    /// Hub whose resolver looks peers up by name.
    pub fn with_config(config: ServiceConfig) -> Self {
        let directory = PeerDirectory::new();
        let resolver = directory.clone();
        let config = config.with_target_resolver(move |args| resolver.resolve(args));
        let hub = InMemoryHub::new();
        let service = HubService::new(Arc::new(hub.clone()), config.clone())
            .expect("valid hub config");
        Self {
            hub,
            directory,
            service,
            config,
        }
    }

    /// Connect a peer service and register it under `name`.
    pub fn peer(&self, name: &str) -> PeerService {
        let peer = PeerService::new(Arc::new(self.hub.connect()), self.config.clone())
            .expect("valid peer config");
        self.directory.register(name, peer.id());
        peer
    }

    /// Like [`peer`](Self::peer), but every request the peer sends to the hub
    /// is also kept in the returned recorder.
    pub fn recorded_peer(&self, name: &str) -> (PeerService, Arc<RecordingPeer>) {
        let recorder = Arc::new(RecordingPeer {
            inner: self.hub.connect(),
            invocations: Mutex::new(Vec::new()),
        });
        let peer = PeerService::new(recorder.clone(), self.config.clone()).expect("valid peer config");
        self.directory.register(name, peer.id());
        (peer, recorder)
    }

    /// Connect a bare transport under `name`, for hand-written replies.
    pub fn raw_peer(&self, name: &str) -> Arc<InMemoryPeer> {
        let peer = Arc::new(self.hub.connect());
        self.directory.register(name, peer.id());
        peer
    }

    pub fn namer(&self) -> ChannelNamer {
        ChannelNamer::new(self.config.channel_prefix.clone())
    }

    /// Make `peer` answer `operation` by hand: `reply` maps each incoming
    /// call to the replies to send, each after `delay`.
    pub fn answer_with<R>(&self, peer: &Arc<InMemoryPeer>, operation: &str, delay: Duration, reply: R)
    where
        R: Fn(PeerMessage) -> Vec<ReplyEnvelope> + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(peer);
        let reply_channel = self.namer().reply_to();
        let listener: Listener = Arc::new(move |_: ConnectionId, payload: Payload| {
            let Ok(message) = from_payload::<PeerMessage>(payload) else {
                return;
            };
            let replies = reply(message);
            let weak = weak.clone();
            let reply_channel = reply_channel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let Some(peer) = weak.upgrade() else {
                    return;
                };
                for envelope in replies {
                    let payload = to_payload(&envelope).expect("encodable reply");
                    let _ = peer.send(&reply_channel, payload).await;
                }
            });
        });
        peer.on(&self.namer().wrap_channel(operation), listener);
    }
}

/// Peer transport that records each `invoke` before passing it on.
pub struct RecordingPeer {
    inner: InMemoryPeer,
    invocations: Mutex<Vec<(String, Payload)>>,
}

impl RecordingPeer {
    /// Payloads sent with `invoke` on `channel`, oldest first.
    pub fn invocations_on(&self, channel: &str) -> Vec<Payload> {
        self.invocations
            .lock()
            .iter()
            .filter(|(sent_on, _)| sent_on == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl PeerTransport for RecordingPeer {
    fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    async fn send(&self, channel: &str, payload: Payload) -> IpcResult<()> {
        self.inner.send(channel, payload).await
    }

    async fn invoke(&self, channel: &str, payload: Payload) -> IpcResult<Payload> {
        self.invocations
            .lock()
            .push((channel.to_string(), payload.clone()));
        self.inner.invoke(channel, payload).await
    }

    fn on(&self, channel: &str, listener: Listener) -> ListenerId {
        self.inner.on(channel, listener)
    }

    fn remove_listener(&self, channel: &str, id: ListenerId) -> bool {
        self.inner.remove_listener(channel, id)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Await `fut`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("test step timed out")
}
