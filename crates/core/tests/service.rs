//! Pairing flows against the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pairlink::{Error, PairingConfig, PairingService, SessionState};
use pairlink_runtime::{
	CredentialRoot, CredentialStore, FakeTransport, MessagingTransport, PairingCodeReply, TransportConnection,
};
use tempfile::TempDir;

struct Harness {
	_tmp: TempDir,
	root: std::path::PathBuf,
	fake: Arc<FakeTransport>,
	service: PairingService,
}

fn harness(fake: FakeTransport) -> Harness {
	let tmp = TempDir::new().unwrap();
	let root = tmp.path().join("sessions");
	let fake = Arc::new(fake);
	let service = PairingService::new(fake.clone(), CredentialRoot::new(&root), PairingConfig::default());
	Harness {
		_tmp: tmp,
		root,
		fake,
		service,
	}
}

impl Harness {
	fn session_dirs(&self) -> usize {
		std::fs::read_dir(&self.root).map(|dir| dir.count()).unwrap_or(0)
	}
}

/// Lets spawned drivers process everything queued so far.
async fn settle() {
	tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn qr_pairing_surfaces_code_then_connects() {
	let h = harness(FakeTransport::new().with_qr_code("2@AbCd,EfGh,IjKl=="));

	let pairing = h.service.pair_qr().await.unwrap();
	assert!(pairing.qr_data_url.starts_with("data:image/svg+xml;base64,"));

	let status = h.service.status(&pairing.session_id).unwrap();
	assert_eq!(status.state, SessionState::AwaitingScan);
	assert_eq!(h.session_dirs(), 1);

	let conn = h.fake.connection(0).unwrap();
	conn.connection_open(Some("94771234567@s.whatsapp.net"));
	settle().await;

	assert!(h.service.status(&pairing.session_id).unwrap().is_connected());
	let sent = h.fake.sent_messages();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].target, "94771234567@s.whatsapp.net");
	assert_eq!(sent[0].body, PairingConfig::default().confirmation_message.unwrap());
}

#[tokio::test(start_paused = true)]
async fn qr_without_code_times_out_and_cleans_up() {
	let h = harness(FakeTransport::new());
	let started = tokio::time::Instant::now();

	let err = h.service.pair_qr().await.unwrap_err();

	assert!(matches!(err, Error::CodeTimeout(d) if d == Duration::from_secs(30)));
	assert!(started.elapsed() >= Duration::from_secs(30));
	assert_eq!(h.service.active_sessions(), 0);
	assert_eq!(h.session_dirs(), 0);
	assert_eq!(h.fake.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn later_qr_codes_are_ignored() {
	let h = harness(FakeTransport::new().with_qr_code("2@first"));

	let pairing = h.service.pair_qr().await.unwrap();
	h.fake.connection(0).unwrap().code_available("2@second");
	settle().await;

	let session = h.service.registry().get(&pairing.session_id).unwrap();
	assert_eq!(
		session.artifact,
		Some(pairlink::PairingArtifact::QrImage {
			data_url: pairing.qr_data_url
		})
	);
}

#[tokio::test(start_paused = true)]
async fn transport_close_removes_session() {
	let h = harness(FakeTransport::new().with_qr_code("2@abc"));

	let pairing = h.service.pair_qr().await.unwrap();
	h.fake.connection(0).unwrap().connection_closed(Some("logged out"));
	settle().await;

	assert!(h.service.status(&pairing.session_id).is_none());
	assert_eq!(h.session_dirs(), 0);
}

#[tokio::test(start_paused = true)]
async fn open_failure_leaves_nothing_behind() {
	let h = harness(FakeTransport::new().failing_open("bridge unreachable"));

	let err = h.service.pair_qr().await.unwrap_err();

	assert!(matches!(err, Error::TransportOpen(ref msg) if msg.contains("bridge unreachable")));
	assert_eq!(h.service.active_sessions(), 0);
	assert_eq!(h.session_dirs(), 0);
}

#[tokio::test(start_paused = true)]
async fn registered_number_never_requests_code() {
	let h = harness(FakeTransport::new().already_registered("94771234567@s.whatsapp.net"));

	let err = h.service.pair_phone("94771234567").await.unwrap_err();

	assert!(matches!(err, Error::AlreadyRegistered));
	assert_eq!(h.fake.code_requests(), 0);
	assert_eq!(h.service.active_sessions(), 0);
	assert_eq!(h.session_dirs(), 0);
}

#[tokio::test(start_paused = true)]
async fn phone_pairing_issues_code_after_settle_delay() {
	let h = harness(FakeTransport::new());
	let started = tokio::time::Instant::now();

	let pairing = h.service.pair_phone("+94 77 123 4567").await.unwrap();

	assert!(started.elapsed() >= Duration::from_secs(3));
	assert_eq!(pairing.code, "ABCD1234");
	assert_eq!(pairing.number, "94771234567");
	assert_eq!(h.fake.code_requests(), 1);
	assert_eq!(
		h.service.status(&pairing.session_id).unwrap().state,
		SessionState::CodeIssued
	);

	h.fake.connection(0).unwrap().connection_open(None);
	settle().await;

	assert!(h.service.status(&pairing.session_id).unwrap().is_connected());
	let sent = h.fake.sent_messages();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].target, "94771234567");
}

#[tokio::test(start_paused = true)]
async fn phone_code_failure_is_reported() {
	let h = harness(FakeTransport::new().with_pairing_code(PairingCodeReply::Fail("rate-overlimit".into())));

	let err = h.service.pair_phone("94771234567").await.unwrap_err();

	assert!(matches!(err, Error::PairingRequest(ref msg) if msg.contains("rate-overlimit")));
	assert_eq!(h.service.active_sessions(), 0);
	assert_eq!(h.session_dirs(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_code_request_is_bounded() {
	let h = harness(FakeTransport::new().with_pairing_code(PairingCodeReply::Hang));

	let err = h.service.pair_phone("94771234567").await.unwrap_err();

	assert!(matches!(err, Error::PairingRequest(_)));
	assert_eq!(h.service.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn idle_phone_session_expires() {
	let h = harness(FakeTransport::new());

	let pairing = h.service.pair_phone("94771234567").await.unwrap();
	tokio::time::sleep(Duration::from_secs(61)).await;

	assert!(h.service.status(&pairing.session_id).is_none());
	assert_eq!(h.session_dirs(), 0);
	assert_eq!(h.fake.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn connected_phone_session_survives_idle_timer() {
	let h = harness(FakeTransport::new());

	let pairing = h.service.pair_phone("94771234567").await.unwrap();
	h.fake.connection(0).unwrap().connection_open(None);
	tokio::time::sleep(Duration::from_secs(120)).await;

	assert!(h.service.status(&pairing.session_id).unwrap().is_connected());
	assert_eq!(h.session_dirs(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_confirmation_keeps_connection() {
	let h = harness(FakeTransport::new().failing_send("not authorized"));

	let pairing = h.service.pair_phone("94771234567").await.unwrap();
	h.fake.connection(0).unwrap().connection_open(None);
	settle().await;

	assert!(h.service.status(&pairing.session_id).unwrap().is_connected());
}

#[tokio::test(start_paused = true)]
async fn digitless_number_is_rejected() {
	let h = harness(FakeTransport::new());

	let err = h.service.pair_phone("+() -").await.unwrap_err();

	assert!(matches!(err, Error::InvalidNumber));
	assert!(h.fake.connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_all_sessions() {
	let h = harness(FakeTransport::new().with_qr_code("2@abc"));

	h.service.pair_qr().await.unwrap();
	h.service.pair_qr().await.unwrap();
	assert_eq!(h.service.sessions().len(), 2);

	let outcomes = h.service.shutdown().await;

	assert_eq!(outcomes.len(), 2);
	assert_eq!(h.service.active_sessions(), 0);
	assert_eq!(h.session_dirs(), 0);
	assert_eq!(h.fake.close_count(), 2);
}

/// Transport whose `open` resolves only after `delay`, or never.
struct StalledTransport {
	delay: Option<Duration>,
	inner: FakeTransport,
}

#[async_trait]
impl MessagingTransport for StalledTransport {
	async fn open(&self, store: Arc<CredentialStore>) -> pairlink_runtime::Result<TransportConnection> {
		match self.delay {
			Some(delay) => tokio::time::sleep(delay).await,
			None => std::future::pending::<()>().await,
		}
		self.inner.open(store).await
	}
}

fn stalled_service(delay: Option<Duration>) -> (TempDir, std::path::PathBuf, PairingService) {
	let tmp = TempDir::new().unwrap();
	let root = tmp.path().join("sessions");
	let transport = Arc::new(StalledTransport {
		delay,
		inner: FakeTransport::new(),
	});
	let service = PairingService::new(transport, CredentialRoot::new(&root), PairingConfig::default());
	(tmp, root, service)
}

fn dir_count(root: &std::path::Path) -> usize {
	std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
}

#[tokio::test(start_paused = true)]
async fn qr_open_that_never_completes_is_bounded() {
	let (_tmp, root, service) = stalled_service(None);
	let started = tokio::time::Instant::now();

	let err = tokio::time::timeout(Duration::from_secs(300), service.pair_qr())
		.await
		.expect("pair_qr must not hang")
		.unwrap_err();

	assert!(matches!(err, Error::CodeTimeout(d) if d == Duration::from_secs(30)));
	assert!(started.elapsed() >= Duration::from_secs(30));
	assert!(started.elapsed() < Duration::from_secs(31));
	assert_eq!(service.active_sessions(), 0);
	assert_eq!(dir_count(&root), 0);
}

#[tokio::test(start_paused = true)]
async fn phone_open_that_never_completes_is_bounded() {
	let (_tmp, root, service) = stalled_service(None);
	let started = tokio::time::Instant::now();

	let err = tokio::time::timeout(Duration::from_secs(300), service.pair_phone("94771234567"))
		.await
		.expect("pair_phone must not hang")
		.unwrap_err();

	assert!(matches!(err, Error::CodeTimeout(d) if d == Duration::from_secs(60)));
	assert!(started.elapsed() >= Duration::from_secs(60));
	assert_eq!(service.active_sessions(), 0);
	assert_eq!(dir_count(&root), 0);
}

#[tokio::test(start_paused = true)]
async fn qr_timeout_counts_from_session_creation() {
	let (_tmp, root, service) = stalled_service(Some(Duration::from_secs(20)));
	let started = tokio::time::Instant::now();

	let err = service.pair_qr().await.unwrap_err();

	assert!(matches!(err, Error::CodeTimeout(d) if d == Duration::from_secs(30)));
	assert!(started.elapsed() >= Duration::from_secs(30));
	assert!(started.elapsed() < Duration::from_secs(31));
	assert_eq!(service.active_sessions(), 0);
	assert_eq!(dir_count(&root), 0);
}
