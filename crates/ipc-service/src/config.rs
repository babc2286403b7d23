//! Service configuration with validation.
//!
//! Set once when a [`HubService`](crate::HubService) or
//! [`PeerService`](crate::PeerService) is constructed.

use ipc_types::{ConnectionId, Payload};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default namespace for every channel name.
pub const DEFAULT_CHANNEL_PREFIX: &str = "ipc-service:";

/// Default pending-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Maps relay lookup arguments to a peer connection (hub only).
pub type TargetResolver = Arc<dyn Fn(&Payload) -> Option<ConnectionId> + Send + Sync>;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("channel prefix cannot be empty")]
    EmptyPrefix,
    #[error("channel prefix contains whitespace: {0:?}")]
    InvalidPrefix(String),
}

/// Process-wide IPC service configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Namespace prepended to every channel name
    pub channel_prefix: String,
    /// Timeout applied when a call does not set one. 0 disables it.
    pub default_timeout_ms: u64,
    /// Relay target resolution strategy (hub only)
    #[serde(skip)]
    pub resolve_target: Option<TargetResolver>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            resolve_target: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("channel_prefix", &self.channel_prefix)
            .field("default_timeout_ms", &self.default_timeout_ms)
            .field("resolve_target", &self.resolve_target.is_some())
            .finish()
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// - `IPC_CHANNEL_PREFIX`: Channel namespace (default: `ipc-service:`)
    /// - `IPC_DEFAULT_TIMEOUT_MS`: Default timeout (default: 5000)
    pub fn from_env() -> Self {
        Self {
            channel_prefix: env::var("IPC_CHANNEL_PREFIX")
                .unwrap_or_else(|_| DEFAULT_CHANNEL_PREFIX.to_string()),
            default_timeout_ms: env::var("IPC_DEFAULT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
            resolve_target: None,
        }
    }

    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// `Duration::ZERO` disables the default timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_target_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Payload) -> Option<ConnectionId> + Send + Sync + 'static,
    {
        self.resolve_target = Some(Arc::new(resolver));
        self
    }

    /// The default timeout, or `None` when disabled.
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }

    /// Resolve the timeout for a call: an explicit value wins (zero means
    /// none), otherwise the default applies.
    pub fn effective_timeout(&self, explicit: Option<Duration>) -> Option<Duration> {
        match explicit {
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => Some(timeout),
            None => self.default_timeout(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.channel_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidPrefix(self.channel_prefix.clone()));
        }
        Ok(())
    }
}
