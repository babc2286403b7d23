//! Call options.

use ipc_types::{ConnectionId, Payload, Target};
use std::time::Duration;

/// Arguments and options for one call.
///
/// `timeout: None` applies the configured default; `Duration::ZERO` waits
/// indefinitely. `target` is only read by relayed calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub data: Payload,
    pub timeout: Option<Duration>,
    pub target: Target,
}

impl Request {
    pub fn new(data: impl Into<Payload>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Address the target peer by connection id.
    pub fn to(mut self, id: ConnectionId) -> Self {
        self.target.id = Some(id);
        self
    }

    /// Address the target peer through the hub's resolver.
    pub fn lookup(mut self, args: impl Into<Payload>) -> Self {
        self.target.lookup = Some(args.into());
        self
    }

    pub(crate) fn timeout_ms(&self) -> Option<u64> {
        self.timeout.map(millis)
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
