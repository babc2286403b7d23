//! Pending Request Table.
//!
//! Maps request ids to callers still waiting for a reply. Whoever removes an
//! entry settles it, so every entry is settled at most once no matter how
//! reply, rejection, timeout and shutdown race each other.
//!
//! Flow:
//! 1. Caller generates a [`RequestId`]
//! 2. Caller calls `register()` (or `add()`) and keeps the receiver
//! 3. Caller sends the request carrying the id
//! 4. A reply listener calls `resolve()` or `reject()`
//! 5. Otherwise the timer or `drop_all()` settles the entry

use ipc_telemetry::{
    metric_inc, PENDING_REQUESTS, REQUESTS_DROPPED, REQUESTS_REJECTED, REQUESTS_TIMED_OUT,
};
use ipc_types::{IpcError, IpcResult, Payload, RequestId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Settles one waiting caller.
pub type Settlement = oneshot::Sender<IpcResult<Payload>>;

/// Receives the outcome of one pending request.
pub type SettlementReceiver = oneshot::Receiver<IpcResult<Payload>>;

struct PendingEntry {
    settle: Settlement,
    timer: Option<AbortHandle>,
    created_at: Instant,
    /// Channel name (for logging)
    channel: String,
}

/// Statistics for a pending request table
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_resolved: AtomicU64,
    pub total_rejected: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_dropped: AtomicU64,
}

/// Request id to waiting caller, owned by one hub or peer service.
pub struct PendingRequestTable {
    /// `hub` or `peer`, used as the metrics label
    role: &'static str,
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
    stats: PendingStats,
}

impl PendingRequestTable {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            entries: Mutex::new(HashMap::new()),
            stats: PendingStats::default(),
        }
    }

    /// Store a caller-supplied settlement under `id`.
    ///
    /// `timer` is aborted when the entry is settled through any other path.
    /// Reusing a live id replaces the old entry, which is rejected.
    pub fn add(
        &self,
        id: RequestId,
        channel: &str,
        settle: Settlement,
        timer: Option<AbortHandle>,
    ) {
        let entry = PendingEntry {
            settle,
            timer,
            created_at: Instant::now(),
            channel: channel.to_string(),
        };
        let replaced = self.entries.lock().insert(id.clone(), entry);
        self.on_insert(&id, channel, replaced);
    }

    /// Register a pending request and get a receiver for its outcome.
    ///
    /// With a timeout, a timer settles the entry with `RequestTimeout` if
    /// nothing else does first.
    pub fn register(
        self: &Arc<Self>,
        id: RequestId,
        channel: &str,
        timeout: Option<Duration>,
    ) -> SettlementReceiver {
        let (tx, rx) = oneshot::channel();

        // Held while the timer is spawned: an early-firing timer blocks on
        // the lock until its entry exists.
        let mut entries = self.entries.lock();
        let timer = timeout.map(|limit| {
            let table = Arc::downgrade(self);
            let request_id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                if let Some(table) = table.upgrade() {
                    table.expire(&request_id, limit);
                }
            })
            .abort_handle()
        });
        let entry = PendingEntry {
            settle: tx,
            timer,
            created_at: Instant::now(),
            channel: channel.to_string(),
        };
        let replaced = entries.insert(id.clone(), entry);
        drop(entries);

        self.on_insert(&id, channel, replaced);
        rx
    }

    /// Settle `id` with a value. Returns false if it was not pending.
    pub fn resolve(&self, id: &RequestId, value: Payload) -> bool {
        let Some(entry) = self.take(id) else {
            debug!(request_id = %id, "Reply for unknown or settled request");
            return false;
        };
        self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %id,
            channel = %entry.channel,
            elapsed_ms = entry.created_at.elapsed().as_millis(),
            "Resolved pending request"
        );
        settle(id, entry, Ok(value));
        true
    }

    /// Settle `id` with an error; `None` means a generic rejection.
    pub fn reject(&self, id: &RequestId, error: Option<IpcError>) -> bool {
        let Some(entry) = self.take(id) else {
            debug!(request_id = %id, "Rejection for unknown or settled request");
            return false;
        };
        let error = error.unwrap_or_else(|| IpcError::RequestRejected {
            request_id: id.clone(),
        });
        self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
        metric_inc!(REQUESTS_REJECTED, &[self.role]);
        debug!(
            request_id = %id,
            channel = %entry.channel,
            error = %error,
            "Rejected pending request"
        );
        settle(id, entry, Err(error));
        true
    }

    /// Reject every pending entry and clear the table.
    ///
    /// Returns the number of entries dropped. Calling it on an empty table
    /// is a no-op.
    pub fn drop_all(&self) -> usize {
        let drained: Vec<(RequestId, PendingEntry)> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            PENDING_REQUESTS.dec();
            let error = IpcError::RequestRejected {
                request_id: id.clone(),
            };
            settle(&id, entry, Err(error));
        }
        if count > 0 {
            self.stats
                .total_dropped
                .fetch_add(count as u64, Ordering::Relaxed);
            REQUESTS_DROPPED
                .with_label_values(&[self.role])
                .inc_by(count as f64);
            warn!(role = self.role, count, "Dropped pending requests");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn expire(&self, id: &RequestId, limit: Duration) {
        let Some(mut entry) = self.take(id) else {
            return;
        };
        // The timer is the running task; nothing to abort.
        entry.timer = None;
        self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        metric_inc!(REQUESTS_TIMED_OUT, &[self.role]);
        warn!(
            request_id = %id,
            channel = %entry.channel,
            timeout_ms = limit.as_millis(),
            "Pending request timed out"
        );
        let error = IpcError::RequestTimeout {
            request_id: id.clone(),
        };
        settle(id, entry, Err(error));
    }

    fn take(&self, id: &RequestId) -> Option<PendingEntry> {
        let entry = self.entries.lock().remove(id)?;
        PENDING_REQUESTS.dec();
        Some(entry)
    }

    fn on_insert(&self, id: &RequestId, channel: &str, replaced: Option<PendingEntry>) {
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        metric_inc!(PENDING_REQUESTS);
        debug!(request_id = %id, channel = channel, role = self.role, "Registered pending request");

        if let Some(old) = replaced {
            PENDING_REQUESTS.dec();
            warn!(request_id = %id, "Request id reused while pending; rejecting previous caller");
            let error = IpcError::RequestRejected {
                request_id: id.clone(),
            };
            settle(id, old, Err(error));
        }
    }
}

fn settle(id: &RequestId, entry: PendingEntry, outcome: IpcResult<Payload>) {
    if let Some(timer) = entry.timer {
        timer.abort();
    }
    if entry.settle.send(outcome).is_err() {
        debug!(request_id = %id, "Caller stopped waiting before settlement");
    }
}
