//! Message dispatch and request handling.
//!
//! Pure logic, no I/O. Each handler takes a mutable reference to
//! [`DaemonState`] and returns a response message plus a [`Followup`]
//! the daemon loop must act on (effects to execute, sampler changes,
//! presenter attachment).

use tokio::time::Instant;

use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Role, Status};
use crate::lock::LockInput;
use crate::model::{AppId, Effect, ScreenPower, Session, ValidationResult};

use super::state::{ConnectionId, DaemonState};

/// Work left for the daemon loop after a request was answered.
#[derive(Debug, Default, PartialEq)]
pub struct Followup {
    pub effects: Vec<Effect>,
    /// Screen power transition; the loop stops or schedules sampling.
    pub power: Option<ScreenPower>,
    /// The connection completed the handshake as a presenter.
    pub attach_presenter: bool,
    /// Session already pending when the presenter attached; it gets the
    /// `present` it missed.
    pub replay: Option<Session>,
}

impl Followup {
    fn effects(effects: Vec<Effect>) -> Self {
        Self {
            effects,
            ..Self::default()
        }
    }
}

/// Dispatch a request message to the appropriate handler.
///
/// Server-originated variants are answered with `unknown_type`.
pub fn handle_message(
    state: &mut DaemonState,
    request: Message,
    connection_id: ConnectionId,
    now: Instant,
) -> (Message, Followup) {
    match request {
        Message::Hello { id, version, role } => handle_hello(state, id, version, role, connection_id),
        Message::ProtectedApps { id, apps } => {
            let apps: Vec<AppId> = apps.into_iter().map(AppId::from).collect();
            let effects = state.manager.handle(LockInput::ProtectedApps(apps), now);
            (ok_response(id), Followup::effects(effects))
        }
        Message::Power { id, state: power } => {
            let effects = state.manager.handle(LockInput::Power(power), now);
            let followup = Followup {
                effects,
                power: Some(power),
                ..Followup::default()
            };
            (ok_response(id), followup)
        }
        Message::Validation { id, success } => {
            state.bridge.report(ValidationResult { success });
            (ok_response(id), Followup::default())
        }
        Message::StoredPattern { id, pattern } => {
            let pending = state.manager.pending_session().map(|s| s.id);
            state.bridge.set_stored_pattern(pattern, pending);
            (ok_response(id), Followup::default())
        }
        Message::DrawnPattern { id, pattern } => {
            let pending = state.manager.pending_session().map(|s| s.id);
            let matched = state.bridge.submit_attempt(pattern, pending);
            let response = Message::Response {
                id,
                status: Status::Ok,
                error: None,
                lock: None,
                matched,
            };
            (response, Followup::default())
        }
        Message::Preferences {
            id,
            strong_challenge,
        } => {
            state.set_strong_challenge(strong_challenge);
            (ok_response(id), Followup::default())
        }
        Message::Permissions {
            id,
            overlay,
            usage_access,
        } => {
            let effects = state
                .update_permissions(overlay, usage_access)
                .into_iter()
                .collect();
            (ok_response(id), Followup::effects(effects))
        }
        Message::Status { id } => {
            let response = Message::Response {
                id,
                status: Status::Ok,
                error: None,
                lock: Some(state.manager.status(state.sampling)),
                matched: None,
            };
            (response, Followup::default())
        }
        // Server-originated messages should never be sent by peers.
        msg @ (Message::HelloAck { .. }
        | Message::Response { .. }
        | Message::Present { .. }
        | Message::Dismiss { .. }
        | Message::Notify { .. }) => (error_response(msg.id(), "unknown_type"), Followup::default()),
    }
}

fn handle_hello(
    state: &mut DaemonState,
    id: u32,
    version: u32,
    role: Role,
    connection_id: ConnectionId,
) -> (Message, Followup) {
    let reject = |reason: &str| {
        let ack = Message::HelloAck {
            id: 0,
            status: Status::Error,
            error: Some(reason.into()),
        };
        (ack, Followup::default())
    };
    if id != 0 {
        return reject("invalid_hello_id");
    }
    if version != PROTOCOL_VERSION {
        return reject("version_mismatch");
    }

    state.add_connection(connection_id, role);
    let ack = Message::HelloAck {
        id: 0,
        status: Status::Ok,
        error: None,
    };
    let presenter = role == Role::Presenter;
    let followup = Followup {
        attach_presenter: presenter,
        replay: if presenter {
            state.manager.pending_session().cloned()
        } else {
            None
        },
        ..Followup::default()
    };
    (ack, followup)
}

fn ok_response(id: u32) -> Message {
    Message::Response {
        id,
        status: Status::Ok,
        error: None,
        lock: None,
        matched: None,
    }
}

pub fn error_response(id: u32, reason: &str) -> Message {
    Message::Response {
        id,
        status: Status::Error,
        error: Some(reason.into()),
        lock: None,
        matched: None,
    }
}
