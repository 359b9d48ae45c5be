//! In-memory transport for testing pairing flows without a bridge.
//!
//! [`FakeTransport`] records every connection it opens and lets tests script
//! what the transport does:
//!
//! ```ignore
//! let fake = Arc::new(FakeTransport::new().with_qr_code("2@abc"));
//! let service = PairingService::new(fake.clone(), root, config);
//!
//! let pairing = service.pair_qr().await?;
//! fake.connection(0).unwrap().connection_open(Some("123@s.whatsapp.net"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::credentials::{AccountInfo, CredentialStore, Credentials};
use crate::error::{Error, Result};
use crate::transport::{MessagingTransport, TransportConnection, TransportEvent, TransportHandle};

/// Scripted reply to `request_pairing_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCodeReply {
	Code(String),
	Fail(String),
	/// Never answers; used to exercise hard timeouts.
	Hang,
}

/// A message recorded by a fake connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
	pub session_id: String,
	pub target: String,
	pub body: String,
}

#[derive(Debug, Clone)]
struct Script {
	qr_codes: Vec<String>,
	registered_account: Option<String>,
	pairing_code: PairingCodeReply,
	open_error: Option<String>,
	send_error: Option<String>,
}

impl Default for Script {
	fn default() -> Self {
		Self {
			qr_codes: Vec::new(),
			registered_account: None,
			pairing_code: PairingCodeReply::Code("ABCD1234".to_string()),
			open_error: None,
			send_error: None,
		}
	}
}

#[derive(Default)]
struct FakeState {
	connections: Mutex<Vec<FakeConnection>>,
	opened: Notify,
	code_requests: AtomicUsize,
	sent: Mutex<Vec<SentMessage>>,
	closes: AtomicUsize,
}

/// Scriptable [`MessagingTransport`].
#[derive(Default)]
pub struct FakeTransport {
	script: Mutex<Script>,
	state: Arc<FakeState>,
}

impl FakeTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Emits `code` as soon as a connection opens. Repeatable.
	pub fn with_qr_code(self, code: impl Into<String>) -> Self {
		self.script.lock().qr_codes.push(code.into());
		self
	}

	/// Writes registered credentials for `account` into every opened store.
	pub fn already_registered(self, account: impl Into<String>) -> Self {
		self.script.lock().registered_account = Some(account.into());
		self
	}

	pub fn with_pairing_code(self, reply: PairingCodeReply) -> Self {
		self.script.lock().pairing_code = reply;
		self
	}

	pub fn failing_open(self, message: impl Into<String>) -> Self {
		self.script.lock().open_error = Some(message.into());
		self
	}

	pub fn failing_send(self, message: impl Into<String>) -> Self {
		self.script.lock().send_error = Some(message.into());
		self
	}

	/// Connections opened so far, in order.
	pub fn connections(&self) -> Vec<FakeConnection> {
		self.state.connections.lock().clone()
	}

	pub fn connection(&self, index: usize) -> Option<FakeConnection> {
		self.state.connections.lock().get(index).cloned()
	}

	/// Waits until the `index`-th connection has been opened.
	pub async fn wait_for_connection(&self, index: usize) -> FakeConnection {
		loop {
			let notified = self.state.opened.notified();
			if let Some(conn) = self.connection(index) {
				return conn;
			}
			notified.await;
		}
	}

	pub fn code_requests(&self) -> usize {
		self.state.code_requests.load(Ordering::SeqCst)
	}

	pub fn sent_messages(&self) -> Vec<SentMessage> {
		self.state.sent.lock().clone()
	}

	pub fn close_count(&self) -> usize {
		self.state.closes.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl MessagingTransport for FakeTransport {
	async fn open(&self, store: Arc<CredentialStore>) -> Result<TransportConnection> {
		let script = self.script.lock().clone();
		if let Some(message) = script.open_error {
			return Err(Error::ConnectionFailed(message));
		}

		if let Some(account) = script.registered_account {
			store.save(Credentials {
				registered: true,
				me: Some(AccountInfo { id: account, name: None }),
				..Credentials::default()
			})?;
		}

		let (events, rx) = mpsc::unbounded_channel();
		for code in script.qr_codes {
			let _ = events.send(TransportEvent::CodeAvailable { code });
		}

		let connection = FakeConnection {
			session_id: store.session_id().to_string(),
			store,
			events,
			closed: Arc::new(AtomicBool::new(false)),
		};
		let handle = Arc::new(FakeHandle {
			connection: connection.clone(),
			pairing_code: script.pairing_code,
			send_error: script.send_error,
			state: Arc::clone(&self.state),
		});

		self.state.connections.lock().push(connection);
		self.state.opened.notify_waiters();

		Ok(TransportConnection { handle, events: rx })
	}
}

/// Test-side view of one fake connection.
#[derive(Clone)]
pub struct FakeConnection {
	pub session_id: String,
	pub store: Arc<CredentialStore>,
	events: mpsc::UnboundedSender<TransportEvent>,
	closed: Arc<AtomicBool>,
}

impl FakeConnection {
	/// Pushes an event; returns `false` once the consumer has gone away.
	pub fn emit(&self, event: TransportEvent) -> bool {
		self.events.send(event).is_ok()
	}

	pub fn code_available(&self, code: &str) -> bool {
		self.emit(TransportEvent::CodeAvailable { code: code.to_string() })
	}

	pub fn connection_open(&self, account: Option<&str>) -> bool {
		self.emit(TransportEvent::ConnectionOpen {
			account: account.map(str::to_string),
		})
	}

	pub fn connection_closed(&self, reason: Option<&str>) -> bool {
		self.emit(TransportEvent::ConnectionClosed {
			reason: reason.map(str::to_string),
		})
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

impl std::fmt::Debug for FakeConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FakeConnection")
			.field("session_id", &self.session_id)
			.field("closed", &self.is_closed())
			.finish()
	}
}

struct FakeHandle {
	connection: FakeConnection,
	pairing_code: PairingCodeReply,
	send_error: Option<String>,
	state: Arc<FakeState>,
}

#[async_trait]
impl TransportHandle for FakeHandle {
	async fn request_pairing_code(&self, _number: &str) -> Result<String> {
		self.state.code_requests.fetch_add(1, Ordering::SeqCst);
		match &self.pairing_code {
			PairingCodeReply::Code(code) => Ok(code.clone()),
			PairingCodeReply::Fail(message) => Err(Error::Remote { message: message.clone() }),
			PairingCodeReply::Hang => std::future::pending().await,
		}
	}

	async fn send_message(&self, target: &str, body: &str) -> Result<()> {
		if let Some(message) = &self.send_error {
			return Err(Error::Rejected(message.clone()));
		}
		self.state.sent.lock().push(SentMessage {
			session_id: self.connection.session_id.clone(),
			target: target.to_string(),
			body: body.to_string(),
		});
		Ok(())
	}

	async fn close(&self) {
		if self.connection.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.state.closes.fetch_add(1, Ordering::SeqCst);
		let _ = self.connection.events.send(TransportEvent::ConnectionClosed {
			reason: Some("closed by client".to_string()),
		});
	}
}
