//! HTTP surface over [`PairingService`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pairlink::phone::format_code;
use pairlink::{PairingService, SessionId};
use pairlink_protocol::{
	HealthResponse, NotFoundResponse, PhoneCodeResponse, QrCodeResponse, SessionEntry, SessionsResponse,
	StatusResponse,
};
use pairlink_runtime::{BridgeTransport, CredentialRoot};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::error::ApiError;

const SERVICE_NAME: &str = "pairlink";

const LANDING_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>pairlink</title></head>
<body>
<h1>pairlink</h1>
<p>Link a device to the messaging transport.</p>
<ul>
<li><a href="/api/code/qr">GET /api/code/qr</a> returns a QR code to scan</li>
<li>GET /api/code/phone?number=&lt;digits&gt; returns a link code for a phone number</li>
<li>GET /api/code/status/{sessionId} reports whether a session is connected</li>
<li><a href="/api/sessions">GET /api/sessions</a> lists active sessions</li>
<li><a href="/api/health">GET /api/health</a> reports service health</li>
</ul>
</body>
</html>
"#;

const NOT_FOUND_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Not found</title></head>
<body><h1>404</h1><p>Page not found. <a href="/">Back to start</a></p></body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<PairingService>,
	pub started: Instant,
}

impl AppState {
	pub fn new(service: Arc<PairingService>) -> Self {
		Self {
			service,
			started: Instant::now(),
		}
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(landing))
		.route("/api/code/qr", get(qr_code))
		.route("/api/code/phone", get(phone_code))
		.route("/api/code/status/{session_id}", get(session_status))
		.route("/api/sessions", get(list_sessions))
		.route("/api/health", get(health))
		.fallback(not_found)
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

/// Serves the API until SIGINT/SIGTERM, then drains every session.
pub async fn run(cli: Cli) -> Result<()> {
	let addr = cli.listen_addr()?;
	let root = CredentialRoot::new(cli.sessions_dir());
	root.ensure()
		.with_context(|| format!("Failed to create sessions directory: {}", root.path().display()))?;

	let config = cli.pairing_config();
	let transport = BridgeTransport::new(cli.bridge_url.clone()).with_request_timeout(config.request_timeout);
	let service = Arc::new(PairingService::new(Arc::new(transport), root, config));

	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind pairing server to {addr}"))?;
	info!(
		target = "pairlink.http",
		%addr,
		bridge = %cli.bridge_url,
		sessions_dir = %cli.sessions_dir().display(),
		"pairing server listening"
	);

	let app = router(AppState::new(Arc::clone(&service)));
	let served = axum::serve(listener, app.into_make_service())
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("Pairing server error");

	let outcomes = service.shutdown().await;
	info!(target = "pairlink.http", sessions = outcomes.len(), "sessions drained");

	served
}

async fn landing() -> Html<&'static str> {
	Html(LANDING_PAGE)
}

async fn qr_code(State(state): State<AppState>) -> Result<Json<QrCodeResponse>, ApiError> {
	let pairing = state.service.pair_qr().await.map_err(ApiError::Qr)?;

	Ok(Json(QrCodeResponse {
		success: true,
		qr_code: pairing.qr_data_url,
		session_id: pairing.session_id.to_string(),
		message: "Scan this QR code with WhatsApp: Linked Devices > Link a Device".to_string(),
	}))
}

#[derive(Debug, Deserialize)]
struct PhoneQuery {
	number: Option<String>,
}

async fn phone_code(
	State(state): State<AppState>,
	Query(query): Query<PhoneQuery>,
) -> Result<Json<PhoneCodeResponse>, ApiError> {
	let number = query
		.number
		.filter(|n| !n.trim().is_empty())
		.ok_or(ApiError::MissingNumber)?;

	let pairing = state.service.pair_phone(&number).await.map_err(ApiError::Phone)?;

	Ok(Json(PhoneCodeResponse {
		success: true,
		code: format_code(&pairing.code),
		message: "Enter this code in WhatsApp: Linked Devices > Link with phone number".to_string(),
		number: pairing.number,
	}))
}

async fn session_status(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
	let summary = state
		.service
		.status(&SessionId::from(session_id))
		.ok_or(ApiError::SessionNotFound)?;

	let connected = summary.is_connected();
	Ok(Json(StatusResponse {
		success: true,
		connected,
		message: Some(if connected { "Session connected" } else { "Waiting for connection" }.to_string()),
		error: None,
	}))
}

async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
	let sessions: Vec<SessionEntry> = state
		.service
		.sessions()
		.into_iter()
		.map(|summary| SessionEntry {
			session_id: summary.id.to_string(),
			connected: summary.is_connected(),
			directory: summary.directory,
		})
		.collect();

	Json(SessionsResponse {
		success: true,
		active_sessions: sessions.len(),
		sessions,
	})
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "healthy".to_string(),
		service: SERVICE_NAME.to_string(),
		version: env!("CARGO_PKG_VERSION").to_string(),
		timestamp: chrono::Utc::now().to_rfc3339(),
		uptime: state.started.elapsed().as_secs_f64(),
		active_sessions: state.service.active_sessions(),
	})
}

async fn not_found(uri: Uri) -> Response {
	let path = uri.path();
	if path == "/api" || path.starts_with("/api/") {
		(StatusCode::NOT_FOUND, Json(NotFoundResponse::default())).into_response()
	} else {
		(StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response()
	}
}

#[cfg(unix)]
async fn shutdown_signal() {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(sigterm) => sigterm,
		Err(err) => {
			warn!(target = "pairlink.http", error = %err, "failed to install SIGTERM handler");
			if let Err(err) = tokio::signal::ctrl_c().await {
				warn!(target = "pairlink.http", error = %err, "failed to listen for Ctrl+C");
			}
			return;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => info!(target = "pairlink.http", "received SIGTERM, shutting down"),
		_ = tokio::signal::ctrl_c() => info!(target = "pairlink.http", "received SIGINT, shutting down"),
	}
}

#[cfg(not(unix))]
async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		warn!(target = "pairlink.http", error = %err, "failed to listen for Ctrl+C");
		return;
	}
	info!(target = "pairlink.http", "received Ctrl+C, shutting down");
}
