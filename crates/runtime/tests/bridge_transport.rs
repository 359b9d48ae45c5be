//! Tests for the WebSocket bridge transport against an in-process bridge.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pairlink_runtime::{BridgeTransport, CredentialRoot, Error, MessagingTransport, TransportEvent};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

fn text(value: Value) -> Message {
	Message::Text(value.to_string())
}

async fn next_request<S>(ws_rx: &mut S) -> Value
where
	S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
	loop {
		match ws_rx.next().await.unwrap().unwrap() {
			Message::Text(raw) => return serde_json::from_str(&raw).unwrap(),
			_ => continue,
		}
	}
}

#[tokio::test]
async fn open_streams_events_and_correlates_requests() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let open = next_request(&mut ws_rx).await;
		assert_eq!(open["method"], "open");
		assert_eq!(open["params"]["session"], "s1");
		// Event before the response: must still be delivered after open returns.
		ws_tx.send(text(json!({ "event": "qr", "code": "2@payload" }))).await.unwrap();
		ws_tx.send(text(json!({ "id": open["id"], "result": null }))).await.unwrap();

		let request = next_request(&mut ws_rx).await;
		assert_eq!(request["method"], "requestPairingCode");
		assert_eq!(request["params"]["number"], "94771234567");
		ws_tx
			.send(text(json!({ "id": request["id"], "result": { "code": "ABCD1234" } })))
			.await
			.unwrap();

		let send = next_request(&mut ws_rx).await;
		assert_eq!(send["method"], "sendMessage");
		ws_tx
			.send(text(json!({ "id": send["id"], "error": { "message": "not connected" } })))
			.await
			.unwrap();

		ws_tx
			.send(text(json!({ "event": "close", "reason": "logged out" })))
			.await
			.unwrap();
	});

	let dir = tempdir().unwrap();
	let store = Arc::new(CredentialRoot::new(dir.path()).open("s1").unwrap());
	let transport = BridgeTransport::new(format!("ws://{addr}")).with_request_timeout(Duration::from_secs(5));
	let mut connection = transport.open(store).await.unwrap();

	assert_eq!(
		connection.events.recv().await,
		Some(TransportEvent::CodeAvailable { code: "2@payload".into() })
	);

	let code = connection.handle.request_pairing_code("94771234567").await.unwrap();
	assert_eq!(code, "ABCD1234");

	let err = connection.handle.send_message("94771234567", "hi").await.unwrap_err();
	assert!(matches!(err, Error::Remote { ref message } if message == "not connected"), "unexpected: {err}");

	assert_eq!(
		connection.events.recv().await,
		Some(TransportEvent::ConnectionClosed {
			reason: Some("logged out".into())
		})
	);

	server.await.unwrap();
}

#[tokio::test]
async fn socket_loss_fails_pending_requests_and_emits_close() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let open = next_request(&mut ws_rx).await;
		ws_tx.send(text(json!({ "id": open["id"], "result": null }))).await.unwrap();

		// Read the pairing request, then drop the socket without answering.
		let _ = next_request(&mut ws_rx).await;
	});

	let dir = tempdir().unwrap();
	let store = Arc::new(CredentialRoot::new(dir.path()).open("s2").unwrap());
	let transport = BridgeTransport::new(format!("ws://{addr}")).with_request_timeout(Duration::from_secs(5));
	let mut connection = transport.open(store).await.unwrap();

	let err = connection.handle.request_pairing_code("1").await.unwrap_err();
	assert!(matches!(err, Error::Closed { .. }), "unexpected: {err}");

	match connection.events.recv().await {
		Some(TransportEvent::ConnectionClosed { .. }) => {}
		other => panic!("expected close event, got {other:?}"),
	}

	server.await.unwrap();
}

#[tokio::test]
async fn open_fails_when_bridge_is_unreachable() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);

	let dir = tempdir().unwrap();
	let store = Arc::new(CredentialRoot::new(dir.path()).open("s3").unwrap());
	let err = BridgeTransport::new(format!("ws://{addr}")).open(store).await.unwrap_err();
	assert!(matches!(err, Error::ConnectionFailed(_)), "unexpected: {err}");
}

#[tokio::test]
async fn close_sends_close_request_and_emits_connection_closed() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let open = next_request(&mut ws_rx).await;
		ws_tx.send(text(json!({ "id": open["id"], "result": null }))).await.unwrap();

		let close = next_request(&mut ws_rx).await;
		assert_eq!(close["method"], "close");
		ws_tx.send(text(json!({ "id": close["id"], "result": null }))).await.unwrap();

		// Reading the close frame answers the handshake.
		while let Some(Ok(message)) = ws_rx.next().await {
			if message.is_close() {
				break;
			}
		}
	});

	let dir = tempdir().unwrap();
	let store = Arc::new(CredentialRoot::new(dir.path()).open("s4").unwrap());
	let transport = BridgeTransport::new(format!("ws://{addr}")).with_request_timeout(Duration::from_secs(5));
	let mut connection = transport.open(store).await.unwrap();

	connection.handle.close().await;

	let event = tokio::time::timeout(Duration::from_secs(5), connection.events.recv())
		.await
		.expect("close event");
	assert!(matches!(event, Some(TransportEvent::ConnectionClosed { .. })), "unexpected: {event:?}");

	let err = connection.handle.send_message("1", "late").await.unwrap_err();
	assert!(matches!(err, Error::Closed { .. }), "unexpected: {err}");

	// A second close is a no-op.
	connection.handle.close().await;
	server.await.unwrap();
}

#[tokio::test]
async fn silent_peer_is_dropped_after_close() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let open = next_request(&mut ws_rx).await;
		ws_tx.send(text(json!({ "id": open["id"], "result": null }))).await.unwrap();

		// Take the close request but never answer it or the close frame.
		let close = next_request(&mut ws_rx).await;
		assert_eq!(close["method"], "close");
		let _ = release_rx.await;

		// Once released, the client side must already be gone.
		let ended = tokio::time::timeout(Duration::from_secs(5), async {
			while let Some(Ok(_)) = ws_rx.next().await {}
		})
		.await;
		assert!(ended.is_ok(), "client kept the socket open");
		drop(ws_tx);
	});

	let dir = tempdir().unwrap();
	let store = Arc::new(CredentialRoot::new(dir.path()).open("s5").unwrap());
	let transport = BridgeTransport::new(format!("ws://{addr}")).with_request_timeout(Duration::from_secs(5));
	let mut connection = transport.open(store).await.unwrap();

	let closed = tokio::time::timeout(Duration::from_secs(10), async {
		connection.handle.close().await;
		connection.events.recv().await
	})
	.await
	.expect("reader must stop after close");
	assert!(matches!(closed, Some(TransportEvent::ConnectionClosed { .. })), "unexpected: {closed:?}");

	release_tx.send(()).unwrap();
	server.await.unwrap();
}
