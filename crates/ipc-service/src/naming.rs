//! Channel naming.
//!
//! Every channel is `<prefix><role>:<name>`. The role tag keeps the three
//! internal control channels apart from user operations, so an operation
//! called `forward-to-peer` cannot shadow the relay.

/// Relay request from a peer (request/acknowledge, handled by the hub).
pub const FORWARD_TO_PEER: &str = "forward-to-peer";

/// Reply from a target peer (fire-and-forget, handled by the hub).
pub const REPLY_TO: &str = "reply-to";

/// Fire-and-forget relay from a peer (handled by the hub).
pub const SEND_TO: &str = "send-to";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Control channels owned by the service.
    Internal,
    /// User-defined operations.
    External,
}

impl ChannelRole {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

/// Derives channel names from the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNamer {
    prefix: String,
}

impl ChannelNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn channel(&self, role: ChannelRole, name: &str) -> String {
        format!("{}{}:{}", self.prefix, role.tag(), name)
    }

    /// Channel of a user operation.
    pub fn wrap_channel(&self, operation: &str) -> String {
        self.channel(ChannelRole::External, operation)
    }

    pub fn internal_channel(&self, operation: &str) -> String {
        self.channel(ChannelRole::Internal, operation)
    }

    pub fn forward_to_peer(&self) -> String {
        self.internal_channel(FORWARD_TO_PEER)
    }

    pub fn reply_to(&self) -> String {
        self.internal_channel(REPLY_TO)
    }

    pub fn send_to(&self) -> String {
        self.internal_channel(SEND_TO)
    }
}
