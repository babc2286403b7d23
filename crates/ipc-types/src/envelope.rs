//! # Relay Envelopes
//!
//! Wire shapes exchanged on the internal control channels and on the
//! external operation channels when the hub delivers a message to a peer.
//!
//! ```text
//! caller peer ──RelayEnvelope──▶ hub ──PeerMessage{meta}──▶ target peer
//!      ▲                          │                            │
//!      └──────── ack ◀────────────┴────◀── ReplyEnvelope ──────┘
//! ```
//!
//! The `request_id` generated by the caller is the sole correlation key; it
//! is carried unchanged through every hop.

use crate::errors::{IpcError, IpcResult};
use crate::id::{ConnectionId, RequestId};
use crate::Payload;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a relayed call names its target peer.
///
/// An explicit id always wins over the hub's lookup function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Explicit target connection.
    pub id: Option<ConnectionId>,
    /// Arguments for the hub's target resolver.
    pub lookup: Option<Payload>,
}

impl Target {
    /// Address a peer by connection id.
    pub fn id(id: ConnectionId) -> Self {
        Self {
            id: Some(id),
            lookup: None,
        }
    }

    /// Address a peer through the hub's resolver.
    pub fn lookup(args: impl Into<Payload>) -> Self {
        Self {
            id: None,
            lookup: Some(args.into()),
        }
    }

    /// Add lookup arguments to an existing target.
    pub fn with_lookup(mut self, args: impl Into<Payload>) -> Self {
        self.lookup = Some(args.into());
        self
    }

    /// Whether at least one addressing mode is present.
    #[must_use]
    pub fn is_addressable(&self) -> bool {
        self.id.is_some() || self.lookup.is_some()
    }
}

/// Metadata delivered alongside a relayed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMeta {
    pub request_id: RequestId,
    /// Connection that issued the call.
    pub caller_id: ConnectionId,
    /// Budget for the handler, in milliseconds. `None` or 0 = unbounded.
    pub timeout_ms: Option<u64>,
}

impl RelayMeta {
    pub fn timeout(&self) -> Option<Duration> {
        budget(self.timeout_ms)
    }
}

/// Peer-originated request asking the hub to forward a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub request_id: RequestId,
    /// Fully qualified channel of the target operation.
    pub channel: String,
    pub caller_id: ConnectionId,
    pub target: Target,
    pub data: Payload,
    pub timeout_ms: Option<u64>,
}

impl RelayEnvelope {
    /// Metadata the target peer receives for this call.
    pub fn meta(&self, timeout_ms: Option<u64>) -> RelayMeta {
        RelayMeta {
            request_id: self.request_id.clone(),
            caller_id: self.caller_id,
            timeout_ms,
        }
    }
}

/// Message delivered by the hub on a peer's external operation channel.
///
/// `meta` is present only when the delivery is part of a call that expects a
/// reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub meta: Option<RelayMeta>,
    pub data: Payload,
}

impl PeerMessage {
    pub fn notification(data: Payload) -> Self {
        Self { meta: None, data }
    }

    pub fn call(meta: RelayMeta, data: Payload) -> Self {
        Self {
            meta: Some(meta),
            data,
        }
    }
}

/// Reply sent by a target peer on the reply channel.
///
/// Exactly one of `data` / `error` is meaningful: a present `error` wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub request_id: RequestId,
    pub data: Option<Payload>,
    pub error: Option<IpcError>,
}

impl ReplyEnvelope {
    pub fn from_result(request_id: RequestId, result: IpcResult<Payload>) -> Self {
        match result {
            Ok(data) => Self {
                request_id,
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                request_id,
                data: None,
                error: Some(error),
            },
        }
    }

    pub fn into_result(self) -> IpcResult<Payload> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or(Payload::Null)),
        }
    }
}

fn budget(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
}
