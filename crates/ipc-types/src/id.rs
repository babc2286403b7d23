//! Request and connection identifiers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alphabet for request ids (URL-safe, 64 symbols).
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Length of a generated request id.
pub const REQUEST_ID_LEN: usize = 21;

/// Correlation key for one in-flight request.
///
/// 21 symbols over a 64-symbol alphabet (126 random bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random request id.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..REQUEST_ID_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Parse an id received from the wire.
    ///
    /// Returns `None` for empty strings; any other string is accepted since
    /// ids are opaque to everyone but their issuer.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            None
        } else {
            Some(Self(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a live transport connection (one per peer).
///
/// The hub itself is addressed as [`ConnectionId::HUB`] when it originates a
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Identifier used by the hub when it is the caller.
    pub const HUB: ConnectionId = ConnectionId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn is_hub(self) -> bool {
        self == Self::HUB
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
