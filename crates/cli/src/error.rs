use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pairlink_protocol::{ErrorResponse, QR_ENDPOINT, StatusResponse};
use thiserror::Error;
use tracing::warn;

/// Failure of an API request, rendered as a JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("phone number required")]
	MissingNumber,

	#[error("session not found or expired")]
	SessionNotFound,

	#[error("QR pairing failed: {0}")]
	Qr(#[source] pairlink::Error),

	#[error("phone pairing failed: {0}")]
	Phone(#[source] pairlink::Error),
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		use pairlink::Error as E;

		match self {
			ApiError::MissingNumber => StatusCode::BAD_REQUEST,
			ApiError::SessionNotFound => StatusCode::NOT_FOUND,
			ApiError::Qr(E::CodeTimeout(_)) | ApiError::Phone(E::CodeTimeout(_)) => StatusCode::REQUEST_TIMEOUT,
			ApiError::Phone(E::TransportOpen(_)) => StatusCode::BAD_GATEWAY,
			ApiError::Phone(E::InvalidNumber) => StatusCode::BAD_REQUEST,
			ApiError::Phone(E::AlreadyRegistered) => StatusCode::CONFLICT,
			ApiError::Qr(_) | ApiError::Phone(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn body(&self) -> ErrorResponse {
		use pairlink::Error as E;

		match self {
			ApiError::MissingNumber | ApiError::Phone(E::InvalidNumber) => ErrorResponse::new(
				"Phone number required",
				"Please provide a phone number with country code, e.g. ?number=94771234567",
			),
			ApiError::SessionNotFound => ErrorResponse::new("Session not found or expired", "Start a new pairing session"),

			ApiError::Qr(E::CodeTimeout(_)) => ErrorResponse::new("QR code timeout", "Please try generating a new QR code"),
			ApiError::Qr(err) => ErrorResponse::new("Failed to generate QR code", err.to_string()),

			ApiError::Phone(E::AlreadyRegistered) => {
				ErrorResponse::new("Already registered", "This number appears to be already registered")
					.with_alternative(QR_ENDPOINT)
			}
			ApiError::Phone(E::CodeTimeout(_)) => {
				ErrorResponse::new("Pairing timeout", "No pairing code was issued in time, try the QR code method")
					.with_qr_endpoint(QR_ENDPOINT)
			}
			ApiError::Phone(err) => {
				ErrorResponse::new("Pairing failed", format!("{err}. Try the QR code method instead"))
					.with_qr_endpoint(QR_ENDPOINT)
			}
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			warn!(target = "pairlink.http", error = %self, %status, "request failed");
		}

		if let ApiError::SessionNotFound = self {
			let body = StatusResponse {
				success: false,
				connected: false,
				message: None,
				error: Some("Session not found or expired".to_string()),
			};
			return (status, Json(body)).into_response();
		}

		(status, Json(self.body())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[test]
	fn qr_timeout_is_408() {
		let err = ApiError::Qr(pairlink::Error::CodeTimeout(Duration::from_secs(30)));
		assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
		assert_eq!(err.body().error, "QR code timeout");
	}

	#[test]
	fn phone_failures_point_at_qr() {
		let registered = ApiError::Phone(pairlink::Error::AlreadyRegistered);
		assert_eq!(registered.status(), StatusCode::CONFLICT);
		assert_eq!(registered.body().alternative.as_deref(), Some(QR_ENDPOINT));

		let failed = ApiError::Phone(pairlink::Error::PairingRequest("rate-overlimit".into()));
		assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(failed.body().qr_endpoint.as_deref(), Some(QR_ENDPOINT));
		assert!(failed.body().message.contains("rate-overlimit"));
	}

	#[test]
	fn unreachable_transport_is_bad_gateway_for_phone_only() {
		let phone = ApiError::Phone(pairlink::Error::TransportOpen("refused".into()));
		assert_eq!(phone.status(), StatusCode::BAD_GATEWAY);

		let qr = ApiError::Qr(pairlink::Error::TransportOpen("refused".into()));
		assert_eq!(qr.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(qr.body().error, "Failed to generate QR code");
		assert!(qr.body().message.contains("refused"));
	}
}
