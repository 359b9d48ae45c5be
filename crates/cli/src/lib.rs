//! HTTP server and command line for pairlink.

pub mod cli;
pub mod error;
pub mod logging;
pub mod server;
