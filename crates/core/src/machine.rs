//! Pure pairing state machines.
//!
//! Each transition is a function `(state, input) -> Transition { next, actions }`
//! with no I/O. The session driver feeds transport events, timer firings and
//! the results of its own side effects in as [`MachineInput`]s and executes the
//! returned [`Action`]s in order.
//!
//! ```text
//! QR:     INITIALIZING ─opened─▶ AWAITING_CODE ─code─▶ AWAITING_SCAN ─open─▶ CONNECTED
//!              └──────────timeout───────┴─▶ TIMED_OUT
//!
//! Phone:  INITIALIZING ─opened─▶ CHECK_REGISTRATION ─unregistered─▶ REQUESTING_CODE
//!                                      └─registered─▶ FAILED            │ settle, request
//!                                                                       ▼
//!                                        CONNECTED ◀─open─ CODE_ISSUED ─timeout─▶ TIMED_OUT
//! ```
//!
//! Any non-terminal state moves to `CLOSED` when the transport closes.
//! Inputs a state does not handle are ignored: the state is kept and no
//! actions are produced. That covers late codes, timers that fire after the
//! session moved on, and anything arriving after a terminal state.

use pairlink_runtime::TransportEvent;

use crate::session::{PairingMethod, SessionState};

/// Something the driver observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineInput {
	/// The transport connection was opened and registered.
	TransportOpened,
	/// The transport surfaced a raw QR payload.
	CodeAvailable(String),
	ConnectionOpen { account: Option<String> },
	ConnectionClosed { reason: Option<String> },
	/// Result of [`Action::InspectRegistration`].
	RegistrationChecked { registered: bool },
	/// The delay requested by [`Action::ScheduleSettle`] has passed.
	SettleElapsed,
	/// The transport returned a link code.
	CodeReceived(String),
	/// The link-code request failed or timed out.
	CodeRequestFailed(String),
	/// The session's current timer fired.
	TimeoutElapsed,
}

impl From<TransportEvent> for MachineInput {
	fn from(event: TransportEvent) -> Self {
		match event {
			TransportEvent::CodeAvailable { code } => MachineInput::CodeAvailable(code),
			TransportEvent::ConnectionOpen { account } => MachineInput::ConnectionOpen { account },
			TransportEvent::ConnectionClosed { reason } => MachineInput::ConnectionClosed { reason },
		}
	}
}

/// Why the caller's pending request fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
	Timeout,
	AlreadyRegistered,
	PairingFailed(String),
	Closed(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
	Always,
	/// Keep the session if the registry shows it connected.
	UnlessConnected,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	/// Start (or restart) the session's hard timer for its method.
	ArmTimeout,
	CancelTimeout,
	/// Render the payload and hand it to the caller.
	SurfaceQr(String),
	/// Read the credential store and answer with [`MachineInput::RegistrationChecked`].
	InspectRegistration,
	/// Answer with [`MachineInput::SettleElapsed`] after the settle delay.
	ScheduleSettle,
	/// Ask the transport for a link code.
	RequestPairingCode,
	/// Hand the link code to the caller.
	SurfaceCode(String),
	/// Best-effort confirmation to the linked account.
	SendConfirmation { account: Option<String> },
	/// Fail the caller's pending request. A no-op once the caller has an answer.
	Reject(Rejection),
	Cleanup(CleanupMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
	pub next: SessionState,
	pub actions: Vec<Action>,
}

impl Transition {
	fn to(next: SessionState, actions: impl Into<Vec<Action>>) -> Self {
		Self {
			next,
			actions: actions.into(),
		}
	}

	fn stay(state: SessionState) -> Self {
		Self {
			next: state,
			actions: Vec::new(),
		}
	}

	fn closed(reason: Option<String>) -> Self {
		Self::to(
			SessionState::Closed,
			[
				Action::CancelTimeout,
				Action::Reject(Rejection::Closed(reason)),
				Action::Cleanup(CleanupMode::Always),
			],
		)
	}

	pub fn is_noop(&self, from: SessionState) -> bool {
		self.next == from && self.actions.is_empty()
	}
}

pub fn transition(method: PairingMethod, state: SessionState, input: MachineInput) -> Transition {
	match method {
		PairingMethod::Qr => qr_transition(state, input),
		PairingMethod::Phone => phone_transition(state, input),
	}
}

pub fn qr_transition(state: SessionState, input: MachineInput) -> Transition {
	use MachineInput as In;
	use SessionState::*;

	if state.is_terminal() {
		return Transition::stay(state);
	}

	match (state, input) {
		(Initializing, In::TransportOpened) => Transition::to(AwaitingCode, [Action::ArmTimeout]),

		(Initializing | AwaitingCode, In::CodeAvailable(code)) => Transition::to(AwaitingScan, [Action::SurfaceQr(code)]),

		(Initializing | AwaitingCode, In::TimeoutElapsed) => Transition::to(
			TimedOut,
			[Action::Reject(Rejection::Timeout), Action::Cleanup(CleanupMode::Always)],
		),

		(AwaitingScan, In::ConnectionOpen { account }) => {
			Transition::to(Connected, [Action::CancelTimeout, Action::SendConfirmation { account }])
		}

		(_, In::ConnectionClosed { reason }) => Transition::closed(reason),

		_ => Transition::stay(state),
	}
}

pub fn phone_transition(state: SessionState, input: MachineInput) -> Transition {
	use MachineInput as In;
	use SessionState::*;

	if state.is_terminal() {
		return Transition::stay(state);
	}

	match (state, input) {
		(Initializing, In::TransportOpened) => {
			Transition::to(CheckRegistration, [Action::ArmTimeout, Action::InspectRegistration])
		}

		(CheckRegistration, In::RegistrationChecked { registered: true }) => Transition::to(
			Failed,
			[
				Action::CancelTimeout,
				Action::Reject(Rejection::AlreadyRegistered),
				Action::Cleanup(CleanupMode::Always),
			],
		),
		(CheckRegistration, In::RegistrationChecked { registered: false }) => {
			Transition::to(RequestingCode, [Action::ScheduleSettle])
		}

		(RequestingCode, In::SettleElapsed) => Transition::to(RequestingCode, [Action::RequestPairingCode]),
		(RequestingCode, In::CodeReceived(code)) => {
			Transition::to(CodeIssued, [Action::ArmTimeout, Action::SurfaceCode(code)])
		}
		(RequestingCode, In::CodeRequestFailed(message)) => Transition::to(
			Failed,
			[
				Action::CancelTimeout,
				Action::Reject(Rejection::PairingFailed(message)),
				Action::Cleanup(CleanupMode::Always),
			],
		),

		(Initializing | CheckRegistration | RequestingCode, In::TimeoutElapsed) => Transition::to(
			TimedOut,
			[Action::Reject(Rejection::Timeout), Action::Cleanup(CleanupMode::Always)],
		),
		(CodeIssued, In::TimeoutElapsed) => Transition::to(TimedOut, [Action::Cleanup(CleanupMode::UnlessConnected)]),

		(CodeIssued, In::ConnectionOpen { account }) => {
			Transition::to(Connected, [Action::CancelTimeout, Action::SendConfirmation { account }])
		}

		(_, In::ConnectionClosed { reason }) => Transition::closed(reason),

		_ => Transition::stay(state),
	}
}

/// One session's machine: method plus current state.
#[derive(Debug, Clone)]
pub struct PairingMachine {
	method: PairingMethod,
	state: SessionState,
}

impl PairingMachine {
	pub fn new(method: PairingMethod) -> Self {
		Self {
			method,
			state: SessionState::Initializing,
		}
	}

	pub fn method(&self) -> PairingMethod {
		self.method
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Applies `input` and returns the transition taken.
	pub fn handle(&mut self, input: MachineInput) -> Transition {
		let transition = transition(self.method, self.state, input);
		debug_assert!(
			transition.next == self.state || self.state.can_transition(self.method, transition.next),
			"machine produced an edge missing from the state graph: {} -> {}",
			self.state,
			transition.next
		);
		self.state = transition.next;
		transition
	}
}
