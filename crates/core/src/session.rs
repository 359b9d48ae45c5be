//! Session identity, states, and the per-method state graph.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pairlink_runtime::{CredentialStore, TransportHandle};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, never reused session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	pub fn generate() -> Self {
		Self(Uuid::new_v4().simple().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<String> for SessionId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

impl From<&str> for SessionId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl AsRef<str> for SessionId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// How the client links to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingMethod {
	Qr,
	Phone,
}

impl fmt::Display for PairingMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			PairingMethod::Qr => "qr",
			PairingMethod::Phone => "phone",
		})
	}
}

/// Lifecycle state of a pairing session.
///
/// QR sessions use `Initializing → AwaitingCode → AwaitingScan → Connected`;
/// phone sessions use `Initializing → CheckRegistration → RequestingCode →
/// CodeIssued → Connected`. `Closed`, `Failed` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
	Initializing,
	AwaitingCode,
	AwaitingScan,
	CheckRegistration,
	RequestingCode,
	CodeIssued,
	Connected,
	Closed,
	Failed,
	TimedOut,
}

impl SessionState {
	pub fn is_terminal(self) -> bool {
		matches!(self, SessionState::Closed | SessionState::Failed | SessionState::TimedOut)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			SessionState::Initializing => "INITIALIZING",
			SessionState::AwaitingCode => "AWAITING_CODE",
			SessionState::AwaitingScan => "AWAITING_SCAN",
			SessionState::CheckRegistration => "CHECK_REGISTRATION",
			SessionState::RequestingCode => "REQUESTING_CODE",
			SessionState::CodeIssued => "CODE_ISSUED",
			SessionState::Connected => "CONNECTED",
			SessionState::Closed => "CLOSED",
			SessionState::Failed => "FAILED",
			SessionState::TimedOut => "TIMED_OUT",
		}
	}

	/// Returns `true` when `method`'s state graph has an edge `self → next`.
	///
	/// Terminal states have no outgoing edges.
	pub fn can_transition(self, method: PairingMethod, next: SessionState) -> bool {
		use PairingMethod::{Phone, Qr};
		use SessionState::*;

		if self.is_terminal() {
			return false;
		}

		match (method, self, next) {
			(_, _, Closed) => true,

			(Qr, Initializing, AwaitingCode | AwaitingScan | TimedOut) => true,
			(Qr, AwaitingCode, AwaitingScan | TimedOut) => true,
			(Qr, AwaitingScan, Connected) => true,

			(Phone, _, Failed) => true,
			(Phone, Initializing, CheckRegistration | TimedOut) => true,
			(Phone, CheckRegistration, RequestingCode | TimedOut) => true,
			(Phone, RequestingCode, CodeIssued | TimedOut) => true,
			(Phone, CodeIssued, Connected | TimedOut) => true,

			_ => false,
		}
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What the caller was given to complete pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingArtifact {
	/// Rendered QR image as a `data:` URL.
	QrImage { data_url: String },
	/// Raw link code issued for a phone number.
	LinkCode { code: String },
}

/// A registered pairing session.
///
/// The credential store and transport handle are owned by the session; the
/// cleanup supervisor closes the handle and deletes the store on teardown.
#[derive(Clone)]
pub struct Session {
	pub id: SessionId,
	pub method: PairingMethod,
	pub state: SessionState,
	pub created_at: DateTime<Utc>,
	pub last_event_at: DateTime<Utc>,
	pub target_phone_number: Option<String>,
	pub artifact: Option<PairingArtifact>,
	pub store: Arc<CredentialStore>,
	pub transport: Arc<dyn TransportHandle>,
}

impl Session {
	pub fn new(id: SessionId, method: PairingMethod, store: Arc<CredentialStore>, transport: Arc<dyn TransportHandle>) -> Self {
		let now = Utc::now();
		Self {
			id,
			method,
			state: SessionState::Initializing,
			created_at: now,
			last_event_at: now,
			target_phone_number: None,
			artifact: None,
			store,
			transport,
		}
	}

	pub fn with_phone_number(mut self, number: Option<String>) -> Self {
		self.target_phone_number = number;
		self
	}

	pub fn is_connected(&self) -> bool {
		self.state == SessionState::Connected
	}

	/// Credential directory backing this session.
	pub fn directory(&self) -> &Path {
		self.store.dir()
	}

	pub fn summary(&self) -> SessionSummary {
		SessionSummary {
			id: self.id.clone(),
			method: self.method,
			state: self.state,
			directory: self.directory().display().to_string(),
		}
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("method", &self.method)
			.field("state", &self.state)
			.field("created_at", &self.created_at)
			.field("last_event_at", &self.last_event_at)
			.field("target_phone_number", &self.target_phone_number)
			.field("directory", &self.directory())
			.finish_non_exhaustive()
	}
}

/// Point-in-time view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
	pub id: SessionId,
	pub method: PairingMethod,
	pub state: SessionState,
	pub directory: String,
}

impl SessionSummary {
	pub fn is_connected(&self) -> bool {
		self.state == SessionState::Connected
	}
}
