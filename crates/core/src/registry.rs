//! Concurrent registry of live pairing sessions.
//!
//! Entries live in a [`DashMap`], so reads and writes for one session never
//! block on another session's shard lock. Removal is the single claim point
//! for teardown: whichever caller gets the entry back from [`SessionRegistry::remove`]
//! owns the cleanup, every other caller sees `None`.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Error, Result};
use crate::session::{PairingArtifact, Session, SessionId, SessionState, SessionSummary};

#[derive(Debug, Default)]
pub struct SessionRegistry {
	sessions: DashMap<SessionId, Session>,
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a new session. Fails if the id is already present.
	pub fn put(&self, session: Session) -> Result<()> {
		match self.sessions.entry(session.id.clone()) {
			Entry::Occupied(entry) => Err(Error::DuplicateSession(entry.key().clone())),
			Entry::Vacant(entry) => {
				entry.insert(session);
				Ok(())
			}
		}
	}

	/// Snapshot of a session.
	pub fn get(&self, id: &SessionId) -> Option<Session> {
		self.sessions.get(id).map(|entry| entry.value().clone())
	}

	pub fn contains(&self, id: &SessionId) -> bool {
		self.sessions.contains_key(id)
	}

	pub fn state(&self, id: &SessionId) -> Option<SessionState> {
		self.sessions.get(id).map(|entry| entry.state)
	}

	/// Moves a session to `next`, returning the previous state.
	///
	/// The edge is checked against the session's method graph under the
	/// entry lock, so concurrent updates to one session serialize.
	pub fn update_state(&self, id: &SessionId, next: SessionState) -> Result<SessionState> {
		let mut entry = self.sessions.get_mut(id).ok_or_else(|| Error::NotFound(id.clone()))?;
		let from = entry.state;
		if !from.can_transition(entry.method, next) {
			return Err(Error::InvalidTransition {
				id: id.clone(),
				from,
				to: next,
			});
		}
		entry.state = next;
		entry.last_event_at = Utc::now();
		Ok(from)
	}

	pub fn record_artifact(&self, id: &SessionId, artifact: PairingArtifact) -> Result<()> {
		let mut entry = self.sessions.get_mut(id).ok_or_else(|| Error::NotFound(id.clone()))?;
		entry.artifact = Some(artifact);
		entry.last_event_at = Utc::now();
		Ok(())
	}

	/// Refreshes `last_event_at` without changing state.
	pub fn touch(&self, id: &SessionId) -> bool {
		match self.sessions.get_mut(id) {
			Some(mut entry) => {
				entry.last_event_at = Utc::now();
				true
			}
			None => false,
		}
	}

	/// Removes and returns the session. A second call returns `None`.
	pub fn remove(&self, id: &SessionId) -> Option<Session> {
		self.sessions.remove(id).map(|(_, session)| session)
	}

	/// Removes the session only if `keep` returns `false` for it.
	pub fn remove_unless(&self, id: &SessionId, keep: impl FnOnce(&Session) -> bool) -> Option<Session> {
		self.sessions.remove_if(id, |_, session| !keep(session)).map(|(_, session)| session)
	}

	/// Summaries of every live session, sorted by creation time.
	pub fn list(&self) -> Vec<SessionSummary> {
		let mut entries: Vec<_> = self
			.sessions
			.iter()
			.map(|entry| (entry.created_at, entry.summary()))
			.collect();
		entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
		entries.into_iter().map(|(_, summary)| summary).collect()
	}

	pub fn ids(&self) -> Vec<SessionId> {
		self.sessions.iter().map(|entry| entry.key().clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}
