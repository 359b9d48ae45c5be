//! Pairing session lifecycle manager.
//!
//! - [`session`]: session identity, states and the per-method state graph
//! - [`registry`]: the concurrent [`SessionRegistry`]
//! - [`machine`]: pure QR and phone state machines
//! - [`supervisor`]: session timers and exactly-once teardown
//! - [`service`]: [`PairingService`], the QR and phone pairing entry points
//!
//! Transports come from `pairlink-runtime`; tests drive the service with its
//! `FakeTransport`.

pub mod config;
mod driver;
pub mod error;
pub mod machine;
pub mod phone;
pub mod qr;
pub mod registry;
pub mod service;
pub mod session;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use config::PairingConfig;
pub use error::{Error, Result};
pub use registry::SessionRegistry;
pub use service::{PairingService, PhonePairing, QrPairing};
pub use session::{PairingArtifact, PairingMethod, Session, SessionId, SessionState, SessionSummary};
pub use supervisor::{CleanupOutcome, CleanupSupervisor};
