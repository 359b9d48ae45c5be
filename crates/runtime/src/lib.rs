//! Messaging transport runtime for pairlink.
//!
//! - [`transport`]: the [`MessagingTransport`] seam and its event model
//! - [`credentials`]: per-session [`CredentialStore`] directories
//! - [`bridge`]: [`BridgeTransport`], a WebSocket client for the external bridge
//! - [`fake`]: [`FakeTransport`], a scriptable in-memory transport for tests

pub mod bridge;
pub mod credentials;
pub mod error;
pub mod fake;
pub mod transport;

pub use bridge::BridgeTransport;
pub use credentials::{AccountInfo, CleanupWarning, CredentialRoot, CredentialStore, Credentials};
pub use error::{Error, Result};
pub use fake::{FakeConnection, FakeTransport, PairingCodeReply, SentMessage};
pub use transport::{MessagingTransport, TransportConnection, TransportEvent, TransportHandle};
