//! JSON bodies served by the pairlink HTTP API.
//!
//! Field names are camelCase on the wire. Every body carries a `success` flag
//! except [`HealthResponse`], which reports `status` instead.

use serde::{Deserialize, Serialize};

/// Path of the QR pairing endpoint, offered as a fallback on phone failures.
pub const QR_ENDPOINT: &str = "/api/code/qr";

/// Endpoints advertised by the API's not-found response.
pub const AVAILABLE_ENDPOINTS: &[&str] = &[
	"GET /api/code/qr",
	"GET /api/code/phone?number=<digits>",
	"GET /api/code/status/{sessionId}",
	"GET /api/sessions",
	"GET /api/health",
];

/// Successful QR pairing response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
	pub success: bool,
	/// `data:` URL of the rendered QR image.
	pub qr_code: String,
	pub session_id: String,
	pub message: String,
}

/// Successful phone pairing response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhoneCodeResponse {
	pub success: bool,
	/// Link code formatted for display.
	pub code: String,
	pub message: String,
	/// Normalized digits-only phone number.
	pub number: String,
}

/// Session status lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
	pub success: bool,
	pub connected: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// One row of [`SessionsResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
	pub session_id: String,
	pub connected: bool,
	/// Credential directory backing the session.
	pub directory: String,
}

/// Listing of every session that has not been cleaned up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
	pub success: bool,
	pub active_sessions: usize,
	pub sessions: Vec<SessionEntry>,
}

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	pub status: String,
	pub service: String,
	pub version: String,
	/// RFC 3339 timestamp of the report.
	pub timestamp: String,
	/// Seconds since the server started.
	pub uptime: f64,
	pub active_sessions: usize,
}

/// Failure body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
	pub success: bool,
	pub error: String,
	pub message: String,
	/// Fallback suggestion for a phone number that cannot be paired.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub alternative: Option<String>,
	/// Fallback endpoint after a failed phone pairing attempt.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub qr_endpoint: Option<String>,
}

impl ErrorResponse {
	pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			success: false,
			error: error.into(),
			message: message.into(),
			alternative: None,
			qr_endpoint: None,
		}
	}

	pub fn with_alternative(mut self, alternative: impl Into<String>) -> Self {
		self.alternative = Some(alternative.into());
		self
	}

	pub fn with_qr_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.qr_endpoint = Some(endpoint.into());
		self
	}
}

/// Body returned for unknown `/api/*` routes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundResponse {
	pub success: bool,
	pub error: String,
	pub available_endpoints: Vec<String>,
}

impl Default for NotFoundResponse {
	fn default() -> Self {
		Self {
			success: false,
			error: "Endpoint not found".to_string(),
			available_endpoints: AVAILABLE_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
		}
	}
}
