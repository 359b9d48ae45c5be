//! Session timers and exactly-once teardown.
//!
//! Every session has at most one armed timer, keyed by session id. Arming a
//! new timer replaces the old one and bumps its generation; a timer only
//! fires if its entry is still the current one when it elapses, and the
//! driver drops firings whose generation it no longer expects. Together
//! these make a stale timer a no-op.
//!
//! Teardown claims the session by removing it from the registry. Only the
//! caller that gets the entry back closes the transport and deletes the
//! credential store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId};

/// What a cleanup call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
	Removed,
	/// Removed, but deleting the credential store reported a warning.
	RemovedWithWarning,
	/// Someone else already cleaned the session up.
	AlreadyGone,
	/// The session is connected and was left in place.
	KeptConnected,
}

impl CleanupOutcome {
	pub fn removed(self) -> bool {
		matches!(self, CleanupOutcome::Removed | CleanupOutcome::RemovedWithWarning)
	}
}

struct ArmedTimer {
	generation: u64,
	/// Dropping the sender cancels the sleeping task.
	_cancel: oneshot::Sender<()>,
}

pub struct CleanupSupervisor {
	registry: Arc<SessionRegistry>,
	timers: Arc<DashMap<SessionId, ArmedTimer>>,
	next_generation: AtomicU64,
}

impl CleanupSupervisor {
	pub fn new(registry: Arc<SessionRegistry>) -> Self {
		Self {
			registry,
			timers: Arc::new(DashMap::new()),
			next_generation: AtomicU64::new(0),
		}
	}

	/// Arms (or re-arms) the timer for `id`.
	///
	/// When it elapses, the returned generation is sent on `fire`.
	pub fn arm_timeout(&self, id: &SessionId, after: Duration, fire: mpsc::UnboundedSender<u64>) -> u64 {
		let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
		let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

		self.timers.insert(
			id.clone(),
			ArmedTimer {
				generation,
				_cancel: cancel_tx,
			},
		);

		let timers = Arc::clone(&self.timers);
		let task_id = id.clone();
		tokio::spawn(async move {
			tokio::select! {
				_ = cancel_rx => {}
				() = tokio::time::sleep(after) => {
					if timers.remove_if(&task_id, |_, timer| timer.generation == generation).is_some() {
						debug!(target = "pairlink.cleanup", session = %task_id, generation, "timer elapsed");
						let _ = fire.send(generation);
					}
				}
			}
		});

		debug!(target = "pairlink.cleanup", session = %id, generation, after_ms = after.as_millis() as u64, "timer armed");
		generation
	}

	/// Cancels the timer for `id`. Returns `false` if none was armed.
	pub fn cancel_timeout(&self, id: &SessionId) -> bool {
		let cancelled = self.timers.remove(id).is_some();
		if cancelled {
			debug!(target = "pairlink.cleanup", session = %id, "timer cancelled");
		}
		cancelled
	}

	pub fn has_timer(&self, id: &SessionId) -> bool {
		self.timers.contains_key(id)
	}

	/// Tears the session down if nobody else has.
	pub async fn cleanup(&self, id: &SessionId) -> CleanupOutcome {
		self.cancel_timeout(id);
		match self.registry.remove(id) {
			Some(session) => self.teardown(session).await,
			None => {
				debug!(target = "pairlink.cleanup", session = %id, "already cleaned up");
				CleanupOutcome::AlreadyGone
			}
		}
	}

	/// Like [`cleanup`](Self::cleanup), but leaves a connected session alone.
	pub async fn cleanup_unless_connected(&self, id: &SessionId) -> CleanupOutcome {
		match self.registry.remove_unless(id, Session::is_connected) {
			Some(session) => {
				self.cancel_timeout(id);
				self.teardown(session).await
			}
			None if self.registry.contains(id) => {
				debug!(target = "pairlink.cleanup", session = %id, "session connected, keeping it");
				CleanupOutcome::KeptConnected
			}
			None => CleanupOutcome::AlreadyGone,
		}
	}

	/// Cleans up every registered session in parallel and waits for all of them.
	pub async fn shutdown(&self) -> Vec<CleanupOutcome> {
		let ids = self.registry.ids();
		if ids.is_empty() {
			return Vec::new();
		}

		info!(target = "pairlink.cleanup", sessions = ids.len(), "draining sessions");
		let outcomes = join_all(ids.iter().map(|id| self.cleanup(id))).await;
		self.timers.clear();
		outcomes
	}

	async fn teardown(&self, session: Session) -> CleanupOutcome {
		session.transport.close().await;

		match session.store.delete() {
			Ok(()) => {
				info!(
					target = "pairlink.cleanup",
					session = %session.id,
					state = %session.state,
					"session cleaned up"
				);
				CleanupOutcome::Removed
			}
			Err(warning) => {
				warn!(
					target = "pairlink.cleanup",
					session = %session.id,
					already_gone = warning.is_already_gone(),
					error = %warning,
					"credential cleanup warning"
				);
				CleanupOutcome::RemovedWithWarning
			}
		}
	}
}
