//! Per-session task that runs a [`PairingMachine`] against a live transport.
//!
//! The driver owns the session's event receiver, its timer channel, the
//! settle delay and any in-flight link-code request, and multiplexes them
//! into machine inputs in arrival order. It answers the pairing caller once,
//! through a oneshot, as soon as the machine surfaces a code or rejects.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use pairlink_runtime::{CredentialStore, TransportEvent, TransportHandle};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use tracing::{debug, warn};

use crate::config::PairingConfig;
use crate::error::{Error, Result};
use crate::machine::{Action, CleanupMode, MachineInput, PairingMachine, Rejection, Transition};
use crate::qr;
use crate::registry::SessionRegistry;
use crate::session::{PairingArtifact, PairingMethod, SessionId};
use crate::supervisor::CleanupSupervisor;

/// What the caller receives once pairing material is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PairingOutcome {
	Qr { data_url: String },
	Phone { code: String },
}

pub(crate) type Reply = oneshot::Sender<Result<PairingOutcome>>;

pub(crate) struct SessionDriver {
	id: SessionId,
	machine: PairingMachine,
	phone_number: Option<String>,
	handle: Arc<dyn TransportHandle>,
	store: Arc<CredentialStore>,
	registry: Arc<SessionRegistry>,
	supervisor: Arc<CleanupSupervisor>,
	config: Arc<PairingConfig>,
	reply: Option<Reply>,
	timer_tx: mpsc::UnboundedSender<u64>,
	timer_rx: mpsc::UnboundedReceiver<u64>,
	generation: Option<u64>,
	settle: Option<Pin<Box<Sleep>>>,
	code_request: Option<BoxFuture<'static, std::result::Result<String, String>>>,
	/// Creation instant; the first armed timer is measured from here.
	created: Option<Instant>,
}

enum Wake {
	Event(Option<TransportEvent>),
	Timer(u64),
	Settled,
	CodeRequest(std::result::Result<String, String>),
}

impl SessionDriver {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		id: SessionId,
		method: PairingMethod,
		phone_number: Option<String>,
		handle: Arc<dyn TransportHandle>,
		store: Arc<CredentialStore>,
		registry: Arc<SessionRegistry>,
		supervisor: Arc<CleanupSupervisor>,
		config: Arc<PairingConfig>,
		created: Instant,
		reply: Reply,
	) -> Self {
		let (timer_tx, timer_rx) = mpsc::unbounded_channel();
		Self {
			id,
			machine: PairingMachine::new(method),
			phone_number,
			handle,
			store,
			registry,
			supervisor,
			config,
			reply: Some(reply),
			timer_tx,
			timer_rx,
			generation: None,
			settle: None,
			code_request: None,
			created: Some(created),
		}
	}

	/// Drives the session until it reaches a terminal state.
	pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
		self.feed(MachineInput::TransportOpened).await;

		while !self.machine.state().is_terminal() {
			let wake = tokio::select! {
				event = events.recv() => Wake::Event(event),
				Some(generation) = self.timer_rx.recv() => Wake::Timer(generation),
				() = take_when_ready(&mut self.settle) => Wake::Settled,
				result = take_when_ready(&mut self.code_request) => Wake::CodeRequest(result),
			};

			let input = match wake {
				Wake::Event(Some(event)) => MachineInput::from(event),
				Wake::Event(None) => MachineInput::ConnectionClosed {
					reason: Some("transport event stream ended".to_string()),
				},
				Wake::Timer(generation) if self.generation == Some(generation) => {
					self.generation = None;
					MachineInput::TimeoutElapsed
				}
				Wake::Timer(generation) => {
					debug!(target = "pairlink.session", session = %self.id, generation, "ignoring stale timer");
					continue;
				}
				Wake::Settled => MachineInput::SettleElapsed,
				Wake::CodeRequest(Ok(code)) => MachineInput::CodeReceived(code),
				Wake::CodeRequest(Err(message)) => MachineInput::CodeRequestFailed(message),
			};

			self.feed(input).await;
		}

		self.respond(Err(Error::Internal(format!(
			"session ended in {} without a result",
			self.machine.state()
		))));
		debug!(target = "pairlink.session", session = %self.id, state = %self.machine.state(), "driver finished");
	}

	/// Applies `input` and every input produced by the resulting actions.
	async fn feed(&mut self, input: MachineInput) {
		let mut queue = VecDeque::from([input]);

		while let Some(input) = queue.pop_front() {
			let from = self.machine.state();
			let Transition { next, actions } = self.machine.handle(input);

			if next != from {
				match self.registry.update_state(&self.id, next) {
					Ok(_) => debug!(target = "pairlink.session", session = %self.id, %from, to = %next, "state changed"),
					Err(err) => debug!(target = "pairlink.session", session = %self.id, error = %err, "registry not updated"),
				}
			} else {
				self.registry.touch(&self.id);
			}

			for action in actions {
				if let Some(follow_up) = self.apply(action).await {
					queue.push_back(follow_up);
				}
			}
		}
	}

	async fn apply(&mut self, action: Action) -> Option<MachineInput> {
		match action {
			Action::ArmTimeout => {
				let mut after = match self.machine.method() {
					PairingMethod::Qr => self.config.qr_timeout,
					PairingMethod::Phone => self.config.phone_timeout,
				};
				if let Some(created) = self.created.take() {
					after = after.saturating_sub(created.elapsed());
				}
				self.generation = Some(self.supervisor.arm_timeout(&self.id, after, self.timer_tx.clone()));
			}
			Action::CancelTimeout => {
				self.generation = None;
				self.supervisor.cancel_timeout(&self.id);
			}
			Action::SurfaceQr(payload) => match qr::render_data_url(&payload) {
				Ok(data_url) => {
					self.record(PairingArtifact::QrImage {
						data_url: data_url.clone(),
					});
					self.respond(Ok(PairingOutcome::Qr { data_url }));
				}
				Err(err) => {
					warn!(target = "pairlink.session", session = %self.id, error = %err, "could not render QR code");
					self.respond(Err(err));
					self.handle.close().await;
				}
			},
			Action::InspectRegistration => {
				let registered = self.store.is_registered();
				debug!(target = "pairlink.session", session = %self.id, registered, "checked registration");
				return Some(MachineInput::RegistrationChecked { registered });
			}
			Action::ScheduleSettle => {
				self.settle = Some(Box::pin(tokio::time::sleep(self.config.settle_delay)));
			}
			Action::RequestPairingCode => {
				let Some(number) = self.phone_number.clone() else {
					return Some(MachineInput::CodeRequestFailed("no phone number for this session".to_string()));
				};
				let handle = Arc::clone(&self.handle);
				let bound = self.config.request_timeout;
				debug!(target = "pairlink.session", session = %self.id, "requesting pairing code");
				self.code_request = Some(Box::pin(async move {
					match tokio::time::timeout(bound, handle.request_pairing_code(&number)).await {
						Ok(Ok(code)) => Ok(code),
						Ok(Err(err)) => Err(err.to_string()),
						Err(_) => Err(format!("no pairing code within {}s", bound.as_secs())),
					}
				}));
			}
			Action::SurfaceCode(code) => {
				self.record(PairingArtifact::LinkCode { code: code.clone() });
				self.respond(Ok(PairingOutcome::Phone { code }));
			}
			Action::SendConfirmation { account } => self.send_confirmation(account).await,
			Action::Reject(rejection) => {
				let err = self.rejection_error(rejection);
				self.respond(Err(err));
			}
			Action::Cleanup(CleanupMode::Always) => {
				self.supervisor.cleanup(&self.id).await;
			}
			Action::Cleanup(CleanupMode::UnlessConnected) => {
				self.supervisor.cleanup_unless_connected(&self.id).await;
			}
		}
		None
	}

	async fn send_confirmation(&mut self, account: Option<String>) {
		let Some(body) = self.config.confirmation_message.as_deref() else {
			return;
		};
		let Some(target) = self.phone_number.clone().or(account) else {
			debug!(target = "pairlink.session", session = %self.id, "no confirmation target");
			return;
		};

		match tokio::time::timeout(self.config.request_timeout, self.handle.send_message(&target, body)).await {
			Ok(Ok(())) => debug!(target = "pairlink.session", session = %self.id, "confirmation sent"),
			Ok(Err(err)) => {
				warn!(target = "pairlink.session", session = %self.id, error = %err, "confirmation message failed")
			}
			Err(_) => warn!(target = "pairlink.session", session = %self.id, "confirmation message timed out"),
		}
	}

	fn rejection_error(&self, rejection: Rejection) -> Error {
		match rejection {
			Rejection::Timeout => Error::CodeTimeout(match self.machine.method() {
				PairingMethod::Qr => self.config.qr_timeout,
				PairingMethod::Phone => self.config.phone_timeout,
			}),
			Rejection::AlreadyRegistered => Error::AlreadyRegistered,
			Rejection::PairingFailed(message) => Error::PairingRequest(message),
			Rejection::Closed(reason) => Error::TransportClosed(reason),
		}
	}

	fn record(&self, artifact: PairingArtifact) {
		if let Err(err) = self.registry.record_artifact(&self.id, artifact) {
			debug!(target = "pairlink.session", session = %self.id, error = %err, "artifact not recorded");
		}
	}

	fn respond(&mut self, result: Result<PairingOutcome>) {
		if let Some(reply) = self.reply.take() {
			let _ = reply.send(result);
		}
	}
}

/// Resolves with the slot's output and empties it; pends forever while empty.
async fn take_when_ready<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
	let Some(future) = slot.as_mut() else {
		return std::future::pending().await;
	};
	let output = future.await;
	*slot = None;
	output
}
