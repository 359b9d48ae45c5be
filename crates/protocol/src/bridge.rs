//! Frames for the messaging bridge WebSocket protocol.
//!
//! The bridge hosts the actual messaging protocol stack. Each pairing session
//! opens its own socket and exchanges JSON text frames:
//!
//! 1. Client sends [`BridgeRequest`] frames carrying a numeric `id`
//! 2. Bridge answers each with a [`BridgeResponse`] (result or error) for that `id`
//! 3. Bridge pushes [`BridgeEvent`] frames (`qr`, `open`, `close`) at any time
//!
//! Incoming frames are decoded through [`BridgeFrame`], which tells responses
//! and events apart by the presence of `id` or `event`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent from pairlink to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeRequest {
	/// Correlation id, unique per socket.
	pub id: u64,
	#[serde(flatten)]
	pub call: BridgeCall,
}

/// Method and parameters of a [`BridgeRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum BridgeCall {
	/// Start a protocol client backed by the given credential directory.
	#[serde(rename_all = "camelCase")]
	Open { session: String, credential_dir: String },
	/// Ask the protocol client for a phone-number link code.
	RequestPairingCode { number: String },
	/// Deliver a text message.
	SendMessage { to: String, text: String },
	/// Tear the protocol client down.
	Close,
}

/// Error payload carried by a failed [`BridgeResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeError {
	pub message: String,
}

/// Response to a [`BridgeRequest`] with the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeResponse {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<BridgeError>,
}

/// Lifecycle event pushed by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
	/// A fresh QR payload is available for scanning.
	Qr { code: String },
	/// The link is established.
	Open {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		account: Option<String>,
	},
	/// The protocol client closed.
	Close {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reason: Option<String>,
	},
}

/// Any frame the bridge may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BridgeFrame {
	Response(BridgeResponse),
	Event(BridgeEvent),
}

/// Result payload of a successful `requestPairingCode` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairingCodeResult {
	pub code: String,
}
