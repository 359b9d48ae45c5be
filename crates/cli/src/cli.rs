use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pairlink::PairingConfig;
use pairlink::config::DEFAULT_CONFIRMATION_MESSAGE;

#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(about = "Pairing server for WhatsApp-protocol messaging transports")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Address to listen on
	#[arg(long, env = "PAIRLINK_HOST", default_value = "0.0.0.0")]
	pub host: String,

	/// Port to listen on
	#[arg(long, env = "PORT", default_value_t = 3000)]
	pub port: u16,

	/// Root directory for per-session credential stores
	#[arg(long, env = "PAIRLINK_SESSIONS_DIR", value_name = "DIR")]
	pub sessions_dir: Option<PathBuf>,

	/// WebSocket URL of the messaging bridge
	#[arg(long, env = "PAIRLINK_BRIDGE_URL", default_value = "ws://127.0.0.1:8765", value_name = "URL")]
	pub bridge_url: String,

	/// Seconds a QR session may wait for its code
	#[arg(long, default_value_t = 30, value_name = "SECS")]
	pub qr_timeout_secs: u64,

	/// Seconds a phone session may wait for the link to open
	#[arg(long, default_value_t = 60, value_name = "SECS")]
	pub phone_timeout_secs: u64,

	/// Delay before requesting a phone link code
	#[arg(long, default_value_t = 3000, value_name = "MS")]
	pub settle_ms: u64,

	/// Bound on a single bridge request
	#[arg(long, default_value_t = 15, value_name = "SECS")]
	pub request_timeout_secs: u64,

	/// Message sent to the account once it is linked
	#[arg(long, default_value = DEFAULT_CONFIRMATION_MESSAGE, value_name = "TEXT")]
	pub confirmation_message: String,

	/// Do not send a confirmation message after linking
	#[arg(long)]
	pub no_confirmation: bool,
}

impl Cli {
	pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
		let addr = format!("{}:{}", self.host, self.port);
		addr.parse()
			.map_err(|e| anyhow::anyhow!("Invalid host/port combination {addr}: {e}"))
	}

	pub fn sessions_dir(&self) -> PathBuf {
		self.sessions_dir.clone().unwrap_or_else(default_sessions_dir)
	}

	pub fn pairing_config(&self) -> PairingConfig {
		PairingConfig {
			qr_timeout: Duration::from_secs(self.qr_timeout_secs),
			phone_timeout: Duration::from_secs(self.phone_timeout_secs),
			settle_delay: Duration::from_millis(self.settle_ms),
			request_timeout: Duration::from_secs(self.request_timeout_secs),
			confirmation_message: (!self.no_confirmation).then(|| self.confirmation_message.clone()),
		}
	}
}

/// `<data-local-dir>/pairlink/sessions`, or `./sessions` when the platform has none.
pub fn default_sessions_dir() -> PathBuf {
	dirs::data_local_dir()
		.map(|dir| dir.join("pairlink").join("sessions"))
		.unwrap_or_else(|| PathBuf::from("sessions"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_pairing_config() {
		let cli = Cli::try_parse_from(["pairlink"]).unwrap();
		let config = cli.pairing_config();
		let defaults = PairingConfig::default();

		assert_eq!(config.qr_timeout, defaults.qr_timeout);
		assert_eq!(config.phone_timeout, defaults.phone_timeout);
		assert_eq!(config.settle_delay, defaults.settle_delay);
		assert_eq!(config.request_timeout, defaults.request_timeout);
		assert_eq!(config.confirmation_message, defaults.confirmation_message);
	}

	#[test]
	fn no_confirmation_disables_message() {
		let cli = Cli::try_parse_from(["pairlink", "--no-confirmation", "--settle-ms", "500"]).unwrap();
		let config = cli.pairing_config();

		assert!(config.confirmation_message.is_none());
		assert_eq!(config.settle_delay, Duration::from_millis(500));
	}

	#[test]
	fn explicit_sessions_dir_wins() {
		let cli = Cli::try_parse_from(["pairlink", "--sessions-dir", "/tmp/pl", "-vv"]).unwrap();
		assert_eq!(cli.sessions_dir(), PathBuf::from("/tmp/pl"));
		assert_eq!(cli.verbose, 2);
	}

	#[test]
	fn listen_addr_combines_host_and_port() {
		let cli = Cli::try_parse_from(["pairlink", "--host", "127.0.0.1", "--port", "8080"]).unwrap();
		assert_eq!(cli.listen_addr().unwrap(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
	}
}
