//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pairlink_runtime::{CredentialStore, TransportHandle};

use crate::session::{PairingMethod, Session, SessionId};

/// Transport handle that only counts `close` calls.
#[derive(Default)]
pub(crate) struct CountingHandle {
	closes: AtomicUsize,
}

impl CountingHandle {
	pub(crate) fn closes(&self) -> usize {
		self.closes.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl TransportHandle for CountingHandle {
	async fn request_pairing_code(&self, _number: &str) -> pairlink_runtime::Result<String> {
		Ok("CODE".into())
	}

	async fn send_message(&self, _target: &str, _body: &str) -> pairlink_runtime::Result<()> {
		Ok(())
	}

	async fn close(&self) {
		self.closes.fetch_add(1, Ordering::SeqCst);
	}
}

pub(crate) fn session(root: &Path, id: &str, method: PairingMethod) -> Session {
	session_with_handle(root, id, method, Arc::new(CountingHandle::default()))
}

pub(crate) fn session_with_handle(root: &Path, id: &str, method: PairingMethod, handle: Arc<CountingHandle>) -> Session {
	let store = CredentialStore::open(root.join(id), id).unwrap();
	Session::new(SessionId::from(id), method, Arc::new(store), handle)
}
