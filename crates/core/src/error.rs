//! Error types for pairing sessions.

use std::time::Duration;

use thiserror::Error;

use crate::session::{SessionId, SessionState};

/// Result type alias for pairing operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// A session with this id is already registered.
	#[error("session {0} already exists")]
	DuplicateSession(SessionId),

	#[error("session {0} not found")]
	NotFound(SessionId),

	/// The state graph has no edge between the two states.
	#[error("invalid transition for session {id}: {from} -> {to}")]
	InvalidTransition {
		id: SessionId,
		from: SessionState,
		to: SessionState,
	},

	/// No pairing code was produced before the session's deadline.
	#[error("no pairing code within {}s", .0.as_secs())]
	CodeTimeout(Duration),

	/// The transport rejected or failed the link-code request.
	#[error("pairing code request failed: {0}")]
	PairingRequest(String),

	/// The credential store already holds a registered account.
	#[error("number is already registered")]
	AlreadyRegistered,

	/// The credential store or transport could not be initialised.
	#[error("failed to open transport: {0}")]
	TransportOpen(String),

	/// The transport closed before the caller received a code.
	#[error("transport closed before pairing completed{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
	TransportClosed(Option<String>),

	/// No digits were left after normalising the phone number.
	#[error("phone number must contain digits")]
	InvalidNumber,

	#[error("internal error: {0}")]
	Internal(String),

	#[error(transparent)]
	Runtime(#[from] pairlink_runtime::Error),
}
