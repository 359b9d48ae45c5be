//! Per-session credential stores.
//!
//! Each pairing session owns one directory under the sessions root. The
//! transport keeps its key material there and records the linked account in
//! `creds.json`. pairlink only reads the registration flag from that document
//! and deletes the whole directory when the session is torn down.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::Result;

/// File name of the credential document inside a store directory.
pub const CREDS_FILE: &str = "creds.json";

/// Account the credentials are linked to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountInfo {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

/// Credential document written by the transport.
///
/// Only `registered` and `me` are interpreted; every other field is kept
/// verbatim so a save never drops transport data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
	#[serde(default)]
	pub registered: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub me: Option<AccountInfo>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Non-fatal failure to delete a credential directory.
///
/// Never propagated to API callers; the cleanup path logs it and moves on.
#[derive(Debug, Error)]
#[error("failed to delete credential directory {}: {source}", dir.display())]
pub struct CleanupWarning {
	pub dir: PathBuf,
	#[source]
	pub source: std::io::Error,
}

impl CleanupWarning {
	/// Returns `true` when the directory was already absent.
	pub fn is_already_gone(&self) -> bool {
		self.source.kind() == ErrorKind::NotFound
	}
}

/// Root directory holding one credential store per session.
#[derive(Debug, Clone)]
pub struct CredentialRoot {
	root: PathBuf,
}

impl CredentialRoot {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn path(&self) -> &Path {
		&self.root
	}

	/// Creates the root directory if it does not exist yet.
	pub fn ensure(&self) -> Result<()> {
		fs::create_dir_all(&self.root)?;
		Ok(())
	}

	/// Directory a session's store lives in.
	pub fn dir_for(&self, session_id: &str) -> PathBuf {
		self.root.join(session_id)
	}

	/// Creates (or loads) the store for `session_id`.
	pub fn open(&self, session_id: &str) -> Result<CredentialStore> {
		CredentialStore::open(self.dir_for(session_id), session_id)
	}
}

/// Durable key material for a single session.
#[derive(Debug)]
pub struct CredentialStore {
	session_id: String,
	dir: PathBuf,
	credentials: RwLock<Credentials>,
}

impl CredentialStore {
	/// Creates the store directory and loads any credentials already present.
	pub fn open(dir: impl Into<PathBuf>, session_id: &str) -> Result<Self> {
		let dir = dir.into();
		fs::create_dir_all(&dir)?;
		let credentials = read_credentials(&dir)?.unwrap_or_default();
		debug!(
			target = "pairlink.credentials",
			session_id,
			dir = %dir.display(),
			registered = credentials.registered,
			"credential store opened"
		);
		Ok(Self {
			session_id: session_id.to_string(),
			dir,
			credentials: RwLock::new(credentials),
		})
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Last loaded or saved credentials.
	pub fn credentials(&self) -> Credentials {
		self.credentials.read().clone()
	}

	/// Re-reads `creds.json`, which the transport may have rewritten.
	pub fn reload(&self) -> Result<Credentials> {
		let loaded = read_credentials(&self.dir)?.unwrap_or_default();
		*self.credentials.write() = loaded.clone();
		Ok(loaded)
	}

	/// Writes `creds.json` and caches the new document.
	pub fn save(&self, credentials: Credentials) -> Result<()> {
		let content = serde_json::to_string_pretty(&credentials)?;
		fs::write(self.dir.join(CREDS_FILE), content)?;
		*self.credentials.write() = credentials;
		Ok(())
	}

	/// Whether the transport reports these credentials as already registered.
	///
	/// An unreadable document counts as unregistered.
	pub fn is_registered(&self) -> bool {
		match self.reload() {
			Ok(creds) => creds.registered,
			Err(err) => {
				warn!(
					target = "pairlink.credentials",
					session_id = %self.session_id,
					error = %err,
					"unreadable credentials; treating as unregistered"
				);
				false
			}
		}
	}

	/// Removes the store directory and everything in it.
	pub fn delete(&self) -> std::result::Result<(), CleanupWarning> {
		fs::remove_dir_all(&self.dir).map_err(|source| CleanupWarning {
			dir: self.dir.clone(),
			source,
		})
	}
}

fn read_credentials(dir: &Path) -> Result<Option<Credentials>> {
	let content = match fs::read_to_string(dir.join(CREDS_FILE)) {
		Ok(c) => c,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(err.into()),
	};
	Ok(Some(serde_json::from_str(&content)?))
}
