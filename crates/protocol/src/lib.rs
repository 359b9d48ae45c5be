//! Wire types for pairlink.
//!
//! This crate contains the serde-serializable shapes that cross a process
//! boundary:
//!
//! - [`bridge`]: JSON frames exchanged with the external messaging bridge
//! - [`api`]: JSON bodies served by the HTTP API
//!
//! Types in this crate are pure data. Behavior lives in `pairlink-runtime`
//! and `pairlink`.

pub mod api;
pub mod bridge;

pub use api::*;
pub use bridge::*;
