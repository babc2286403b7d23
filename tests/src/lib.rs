//! # IPC Service Test Suite
//!
//! End-to-end flows across a hub and several peers on the in-memory
//! transport.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs    # Hub + named peers fixture
//!     ├── direct.rs     # Peer -> hub calls and notifications
//!     ├── relay.rs      # Peer -> hub -> peer correlation
//!     └── lifecycle.rs  # Shutdown, once-listeners, unsubscribe, prefixes
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ipc-tests
//! cargo test -p ipc-tests integration::relay::
//! ```

#![allow(dead_code)]
