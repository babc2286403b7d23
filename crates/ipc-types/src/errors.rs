//! # Error Types
//!
//! Failure taxonomy for calls made through the IPC service. Every variant can
//! travel inside a [`ReplyEnvelope`](crate::ReplyEnvelope), so the enum is
//! serde-tagged by `kind`.

use crate::id::{ConnectionId, RequestId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the IPC crates.
pub type IpcResult<T> = Result<T, IpcError>;

/// Errors surfaced to the caller of an IPC operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IpcError {
    /// A direct call or a handler did not settle within its budget.
    #[error("Invoke function timed out")]
    InvokeTimeout { channel: String },

    /// The hub gave up waiting for a relayed reply.
    #[error("Request timeout")]
    RequestTimeout { request_id: RequestId },

    /// Relay addressing produced no usable target identifier.
    #[error("target peer id is required")]
    TargetUnresolved,

    /// The resolved identifier has no live connection.
    #[error("no such connection: {id}")]
    ConnectionNotFound { id: ConnectionId },

    /// A listener failed. The message is propagated verbatim.
    #[error("{message}")]
    HandlerFailure { message: String },

    /// Generic rejection, used when pending entries are dropped.
    #[error("request rejected: {request_id}")]
    RequestRejected { request_id: RequestId },

    /// The underlying transport failed to deliver or answer.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A message could not be decoded into the expected envelope.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },
}

impl IpcError {
    /// Build a handler failure from any displayable error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            message: message.into(),
        }
    }

    /// Build a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// True for both direct-call and relay timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::InvokeTimeout { .. } | Self::RequestTimeout { .. })
    }
}
