//! WebSocket client for the external messaging bridge.
//!
//! The bridge process hosts the messaging protocol stack. [`BridgeTransport`]
//! opens one socket per pairing session and layers request/response
//! correlation on top of it:
//!
//! 1. A call allocates an id and parks a oneshot sender in the pending table
//! 2. The request frame is queued to the writer task
//! 3. The reader task routes responses to the parked sender by id
//! 4. Event frames are forwarded, in order, to the connection's event channel
//!
//! When the socket ends, every pending call fails with [`Error::Closed`] and
//! a final [`TransportEvent::ConnectionClosed`] is emitted. After a local
//! close the peer has [`CLOSE_TIMEOUT`] to finish the handshake before the
//! socket is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pairlink_protocol::{BridgeCall, BridgeEvent, BridgeFrame, BridgeRequest, BridgeResponse, PairingCodeResult};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::transport::{MessagingTransport, TransportConnection, TransportEvent, TransportHandle};

/// Default bound on a single bridge request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on the courtesy `close` call sent before dropping the socket.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type PendingTable = Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>;

/// [`MessagingTransport`] backed by a WebSocket bridge.
#[derive(Debug, Clone)]
pub struct BridgeTransport {
	url: String,
	request_timeout: Duration,
}

impl BridgeTransport {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}

#[async_trait]
impl MessagingTransport for BridgeTransport {
	async fn open(&self, store: Arc<CredentialStore>) -> Result<TransportConnection> {
		let (socket, _) = tokio::time::timeout(self.request_timeout, connect_async(self.url.as_str()))
			.await
			.map_err(|_| {
				Error::ConnectionFailed(format!(
					"{}: no connection within {}ms",
					self.url,
					self.request_timeout.as_millis()
				))
			})?
			.map_err(|e| Error::ConnectionFailed(format!("{}: {e}", self.url)))?;
		let (mut sink, mut stream) = socket.split();

		let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let shared = Arc::new(BridgeShared {
			session_id: store.session_id().to_string(),
			pending: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(1),
			out_tx,
			closed: AtomicBool::new(false),
			shutdown: Notify::new(),
		});

		tokio::spawn(async move {
			while let Some(message) = out_rx.recv().await {
				let is_close = matches!(message, Message::Close(_));
				if let Err(err) = sink.send(message).await {
					debug!(target = "pairlink.bridge", error = %err, "bridge write failed");
					break;
				}
				if is_close {
					break;
				}
			}
			let _ = sink.close().await;
		});

		let reader_shared = Arc::clone(&shared);
		tokio::spawn(async move {
			let mut reason = None;
			let mut closed_locally = false;
			loop {
				let message = tokio::select! {
					message = stream.next() => message,
					() = reader_shared.shutdown.notified() => {
						closed_locally = true;
						reason = Some("closed by client".to_string());
						break;
					}
				};
				match message {
					Some(Ok(Message::Text(text))) => reader_shared.dispatch(&text, &event_tx),
					Some(Ok(Message::Close(frame))) => {
						reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
						break;
					}
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						reason = Some(err.to_string());
						break;
					}
					None => break,
				}
			}
			if closed_locally {
				let drained = tokio::time::timeout(CLOSE_TIMEOUT, async {
					while let Some(Ok(message)) = stream.next().await {
						if message.is_close() {
							break;
						}
					}
				})
				.await;
				if drained.is_err() {
					debug!(
						target = "pairlink.bridge",
						session_id = %reader_shared.session_id,
						"peer did not finish the close handshake"
					);
				}
			}
			drop(stream);
			reader_shared.closed.store(true, Ordering::SeqCst);
			reader_shared.fail_pending(reason.clone());
			debug!(
				target = "pairlink.bridge",
				session_id = %reader_shared.session_id,
				reason = ?reason,
				"bridge socket ended"
			);
			let _ = event_tx.send(TransportEvent::ConnectionClosed { reason });
		});

		let handle = Arc::new(BridgeHandle {
			shared,
			request_timeout: self.request_timeout,
		});

		let opened = handle
			.call(BridgeCall::Open {
				session: store.session_id().to_string(),
				credential_dir: store.dir().display().to_string(),
			})
			.await;
		if let Err(err) = opened {
			handle.close().await;
			return Err(err);
		}

		Ok(TransportConnection { handle, events: event_rx })
	}
}

struct BridgeShared {
	session_id: String,
	pending: PendingTable,
	next_id: AtomicU64,
	out_tx: mpsc::UnboundedSender<Message>,
	closed: AtomicBool,
	/// Tells the reader a local close was sent.
	shutdown: Notify,
}

impl BridgeShared {
	fn dispatch(&self, raw: &str, events: &mpsc::UnboundedSender<TransportEvent>) {
		let frame = match serde_json::from_str::<BridgeFrame>(raw) {
			Ok(frame) => frame,
			Err(err) => {
				warn!(target = "pairlink.bridge", error = %err, "ignoring malformed bridge frame");
				return;
			}
		};

		match frame {
			BridgeFrame::Response(response) => self.complete(response),
			BridgeFrame::Event(event) => {
				trace!(target = "pairlink.bridge", session_id = %self.session_id, ?event, "bridge event");
				let _ = events.send(match event {
					BridgeEvent::Qr { code } => TransportEvent::CodeAvailable { code },
					BridgeEvent::Open { account } => TransportEvent::ConnectionOpen { account },
					BridgeEvent::Close { reason } => TransportEvent::ConnectionClosed { reason },
				});
			}
		}
	}

	fn complete(&self, response: BridgeResponse) {
		let Some(sender) = self.pending.lock().remove(&response.id) else {
			warn!(target = "pairlink.bridge", id = response.id, "response for unknown request id");
			return;
		};
		let result = match response.error {
			Some(error) => Err(Error::Remote { message: error.message }),
			None => Ok(response.result.unwrap_or(Value::Null)),
		};
		let _ = sender.send(result);
	}

	fn fail_pending(&self, reason: Option<String>) {
		for (_, sender) in self.pending.lock().drain() {
			let _ = sender.send(Err(Error::Closed { reason: reason.clone() }));
		}
	}
}

/// [`TransportHandle`] for one bridge socket.
struct BridgeHandle {
	shared: Arc<BridgeShared>,
	request_timeout: Duration,
}

impl BridgeHandle {
	async fn call(&self, call: BridgeCall) -> Result<Value> {
		self.call_with_timeout(call, self.request_timeout).await
	}

	async fn call_with_timeout(&self, call: BridgeCall, timeout: Duration) -> Result<Value> {
		if self.shared.closed.load(Ordering::SeqCst) {
			return Err(Error::Closed { reason: None });
		}

		let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.shared.pending.lock().insert(id, tx);

		let payload = serde_json::to_string(&BridgeRequest { id, call })?;
		if self.shared.out_tx.send(Message::Text(payload)).is_err() {
			self.shared.pending.lock().remove(&id);
			return Err(Error::TransportError("bridge writer stopped".to_string()));
		}

		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::Closed { reason: None }),
			Err(_) => {
				self.shared.pending.lock().remove(&id);
				Err(Error::Timeout(format!("bridge request {id} after {}ms", timeout.as_millis())))
			}
		}
	}
}

#[async_trait]
impl TransportHandle for BridgeHandle {
	async fn request_pairing_code(&self, number: &str) -> Result<String> {
		let value = self
			.call(BridgeCall::RequestPairingCode {
				number: number.to_string(),
			})
			.await?;
		let result: PairingCodeResult =
			serde_json::from_value(value).map_err(|e| Error::ProtocolError(format!("invalid pairing code result: {e}")))?;
		Ok(result.code)
	}

	async fn send_message(&self, target: &str, body: &str) -> Result<()> {
		self.call(BridgeCall::SendMessage {
			to: target.to_string(),
			text: body.to_string(),
		})
		.await
		.map(|_| ())
	}

	async fn close(&self) {
		if self.shared.closed.load(Ordering::SeqCst) {
			return;
		}
		if let Err(err) = self.call_with_timeout(BridgeCall::Close, CLOSE_TIMEOUT).await {
			debug!(
				target = "pairlink.bridge",
				session_id = %self.shared.session_id,
				error = %err,
				"bridge close call failed"
			);
		}
		if !self.shared.closed.swap(true, Ordering::SeqCst) {
			let _ = self.shared.out_tx.send(Message::Close(None));
			self.shared.shutdown.notify_one();
		}
	}
}
