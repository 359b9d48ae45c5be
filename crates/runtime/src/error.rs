//! Error types for the transport runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a messaging transport.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish a connection to the bridge.
	#[error("Failed to connect to messaging bridge: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (socket read/write).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Malformed or unexpected frame.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The bridge answered a request with an error.
	#[error("Bridge error: {message}")]
	Remote { message: String },

	/// The connection closed while a request was in flight.
	#[error("Connection closed{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
	Closed { reason: Option<String> },

	/// Timeout waiting for a response.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Operation rejected by a scripted or misconfigured transport.
	#[error("{0}")]
	Rejected(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}
