//! Pairing entry points.
//!
//! [`PairingService`] is the root of the core: each pairing call opens a
//! credential store and a transport connection, registers the session,
//! spawns its driver and waits for the driver's first answer.

use std::sync::Arc;

use pairlink_runtime::{CredentialRoot, MessagingTransport};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::PairingConfig;
use crate::driver::{PairingOutcome, SessionDriver};
use crate::error::{Error, Result};
use crate::phone::normalize_number;
use crate::registry::SessionRegistry;
use crate::session::{PairingMethod, Session, SessionId, SessionSummary};
use crate::supervisor::{CleanupOutcome, CleanupSupervisor};

/// A QR session waiting to be scanned.
#[derive(Debug, Clone)]
pub struct QrPairing {
	pub session_id: SessionId,
	/// SVG QR image as a `data:` URL.
	pub qr_data_url: String,
}

/// A phone session whose link code has been issued.
#[derive(Debug, Clone)]
pub struct PhonePairing {
	pub session_id: SessionId,
	/// Raw code as returned by the transport.
	pub code: String,
	/// Digits-only number the code was requested for.
	pub number: String,
}

pub struct PairingService {
	transport: Arc<dyn MessagingTransport>,
	root: CredentialRoot,
	config: Arc<PairingConfig>,
	registry: Arc<SessionRegistry>,
	supervisor: Arc<CleanupSupervisor>,
}

impl PairingService {
	pub fn new(transport: Arc<dyn MessagingTransport>, root: CredentialRoot, config: PairingConfig) -> Self {
		let registry = Arc::new(SessionRegistry::new());
		let supervisor = Arc::new(CleanupSupervisor::new(Arc::clone(&registry)));
		Self {
			transport,
			root,
			config: Arc::new(config),
			registry,
			supervisor,
		}
	}

	pub fn config(&self) -> &PairingConfig {
		&self.config
	}

	pub fn registry(&self) -> &Arc<SessionRegistry> {
		&self.registry
	}

	pub fn supervisor(&self) -> &Arc<CleanupSupervisor> {
		&self.supervisor
	}

	/// Starts a QR session and returns once its code is rendered.
	pub async fn pair_qr(&self) -> Result<QrPairing> {
		let (session_id, outcome) = self.start(PairingMethod::Qr, None).await?;
		match outcome {
			PairingOutcome::Qr { data_url } => Ok(QrPairing {
				session_id,
				qr_data_url: data_url,
			}),
			PairingOutcome::Phone { .. } => Err(Error::Internal("QR session produced a link code".to_string())),
		}
	}

	/// Starts a phone session for `number` and returns the issued link code.
	///
	/// Non-digit characters are stripped from `number` first.
	pub async fn pair_phone(&self, number: &str) -> Result<PhonePairing> {
		let number = normalize_number(number).ok_or(Error::InvalidNumber)?;
		let (session_id, outcome) = self.start(PairingMethod::Phone, Some(number.clone())).await?;
		match outcome {
			PairingOutcome::Phone { code } => Ok(PhonePairing {
				session_id,
				code,
				number,
			}),
			PairingOutcome::Qr { .. } => Err(Error::Internal("phone session produced a QR code".to_string())),
		}
	}

	/// Current view of a session, if it is still registered.
	pub fn status(&self, id: &SessionId) -> Option<SessionSummary> {
		self.registry.get(id).map(|session| session.summary())
	}

	pub fn sessions(&self) -> Vec<SessionSummary> {
		self.registry.list()
	}

	pub fn active_sessions(&self) -> usize {
		self.registry.len()
	}

	/// Tears down every session and waits for all cleanups to settle.
	pub async fn shutdown(&self) -> Vec<CleanupOutcome> {
		self.supervisor.shutdown().await
	}

	async fn start(&self, method: PairingMethod, number: Option<String>) -> Result<(SessionId, PairingOutcome)> {
		self.root.ensure()?;

		let id = SessionId::generate();
		let store = Arc::new(
			self.root
				.open(id.as_str())
				.map_err(|e| Error::TransportOpen(e.to_string()))?,
		);

		let created = Instant::now();
		let bound = match method {
			PairingMethod::Qr => self.config.qr_timeout,
			PairingMethod::Phone => self.config.phone_timeout,
		};
		let opened = match tokio::time::timeout(bound, self.transport.open(Arc::clone(&store))).await {
			Ok(Ok(connection)) => Ok(connection),
			Ok(Err(err)) => {
				warn!(target = "pairlink.session", session = %id, error = %err, "transport open failed");
				Err(Error::TransportOpen(err.to_string()))
			}
			Err(_) => {
				warn!(target = "pairlink.session", session = %id, after_secs = bound.as_secs(), "transport open timed out");
				Err(Error::CodeTimeout(bound))
			}
		};
		let connection = match opened {
			Ok(connection) => connection,
			Err(err) => {
				if let Err(warning) = store.delete() {
					warn!(target = "pairlink.cleanup", session = %id, error = %warning, "credential cleanup warning");
				}
				return Err(err);
			}
		};

		let session = Session::new(id.clone(), method, Arc::clone(&store), Arc::clone(&connection.handle))
			.with_phone_number(number.clone());
		if let Err(err) = self.registry.put(session) {
			connection.handle.close().await;
			if let Err(warning) = store.delete() {
				warn!(target = "pairlink.cleanup", session = %id, error = %warning, "credential cleanup warning");
			}
			return Err(err);
		}
		info!(target = "pairlink.session", session = %id, %method, "session created");

		let (reply_tx, reply_rx) = oneshot::channel();
		let driver = SessionDriver::new(
			id.clone(),
			method,
			number,
			connection.handle,
			store,
			Arc::clone(&self.registry),
			Arc::clone(&self.supervisor),
			Arc::clone(&self.config),
			created,
			reply_tx,
		);
		tokio::spawn(driver.run(connection.events));

		let outcome = reply_rx
			.await
			.map_err(|_| Error::Internal("session driver stopped without answering".to_string()))??;
		Ok((id, outcome))
	}
}
