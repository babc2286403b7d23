//! # IPC Types Crate
//!
//! Vocabulary shared by every participant of the IPC service: the hub, the
//! peers and the transport they talk over.
//!
//! ## Design Principles
//!
//! - **Opaque payloads**: arguments and results are plain `serde_json::Value`s.
//!   Schema enforcement belongs to whoever defines the operations.
//! - **Single correlation key**: a [`RequestId`] is the only thing used to match
//!   a reply back to the call that produced it.
//! - **Serializable failures**: [`IpcError`] crosses process boundaries inside
//!   reply envelopes, so it derives serde like the envelopes do.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod envelope;
pub mod errors;
pub mod id;

pub use envelope::{PeerMessage, RelayEnvelope, RelayMeta, ReplyEnvelope, Target};
pub use errors::{IpcError, IpcResult};
pub use id::{ConnectionId, RequestId};

/// Opaque structured value carried by every message.
pub type Payload = serde_json::Value;

/// Encode a typed value into a [`Payload`].
pub fn to_payload<T: serde::Serialize>(value: &T) -> IpcResult<Payload> {
    serde_json::to_value(value).map_err(|e| IpcError::InvalidPayload {
        message: e.to_string(),
    })
}

/// Decode a [`Payload`] into a typed value.
pub fn from_payload<T: serde::de::DeserializeOwned>(payload: Payload) -> IpcResult<T> {
    serde_json::from_value(payload).map_err(|e| IpcError::InvalidPayload {
        message: e.to_string(),
    })
}
