//! The messaging transport seam.
//!
//! A [`MessagingTransport`] opens one protocol client per pairing session,
//! backed by that session's [`CredentialStore`]. Opening yields a
//! [`TransportConnection`]: a [`TransportHandle`] for outbound calls plus an
//! ordered stream of [`TransportEvent`]s.
//!
//! Events for one connection are delivered in the order the transport
//! produced them. When the event receiver ends, the connection is gone and
//! consumers should treat it as [`TransportEvent::ConnectionClosed`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::credentials::CredentialStore;
use crate::error::Result;

/// Lifecycle event emitted by an open transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// Raw pairing payload ready to be rendered as a scannable code.
	CodeAvailable { code: String },
	/// The link is established; `account` identifies the linked user when known.
	ConnectionOpen { account: Option<String> },
	/// The connection ended.
	ConnectionClosed { reason: Option<String> },
}

/// Outbound side of an open transport connection.
#[async_trait]
pub trait TransportHandle: Send + Sync {
	/// Requests a phone-number link code.
	async fn request_pairing_code(&self, number: &str) -> Result<String>;

	/// Sends a text message to `target`.
	async fn send_message(&self, target: &str, body: &str) -> Result<()>;

	/// Closes the connection. Safe to call more than once.
	async fn close(&self);
}

/// Factory for transport connections.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
	/// Opens a connection backed by `store`.
	async fn open(&self, store: Arc<CredentialStore>) -> Result<TransportConnection>;
}

/// A live transport connection.
pub struct TransportConnection {
	pub handle: Arc<dyn TransportHandle>,
	pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl std::fmt::Debug for TransportConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportConnection").finish_non_exhaustive()
	}
}
