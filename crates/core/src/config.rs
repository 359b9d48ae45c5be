//! Pairing timing and confirmation settings.

use std::time::Duration;

/// Hard bound on a QR session that has not surfaced a code.
pub const DEFAULT_QR_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle bound on a phone session waiting for the link to open.
pub const DEFAULT_PHONE_TIMEOUT: Duration = Duration::from_secs(60);
/// Delay before asking the transport for a link code.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);
/// Bound on a single outbound transport call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Message sent to the linked account once the connection opens.
pub const DEFAULT_CONFIRMATION_MESSAGE: &str = "Device linked successfully.";

#[derive(Debug, Clone)]
pub struct PairingConfig {
	pub qr_timeout: Duration,
	pub phone_timeout: Duration,
	/// The transport needs its handshake state to settle before a link-code
	/// request is accepted.
	pub settle_delay: Duration,
	pub request_timeout: Duration,
	/// `None` disables the post-connect confirmation message.
	pub confirmation_message: Option<String>,
}

impl Default for PairingConfig {
	fn default() -> Self {
		Self {
			qr_timeout: DEFAULT_QR_TIMEOUT,
			phone_timeout: DEFAULT_PHONE_TIMEOUT,
			settle_delay: DEFAULT_SETTLE_DELAY,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			confirmation_message: Some(DEFAULT_CONFIRMATION_MESSAGE.to_string()),
		}
	}
}
