//! Presentation gateway: effects out to challenge surfaces.
//!
//! [`PresenterHub`] is the only production implementation: it pushes
//! unsolicited `present` / `dismiss` / `notify` frames to every
//! connection that completed the handshake as [`Role::Presenter`].
//!
//! [`Role::Presenter`]: crate::ipc::protocol::Role::Presenter

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::ipc::protocol::Message;
use crate::model::{AppId, ChallengeKind, SessionId};

use super::state::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("no presenter attached")]
    NoPresenter,
    #[error("all presenters disconnected")]
    Disconnected,
}

/// Shows and hides the challenge for a session.
pub trait PresentationGateway: Send + Sync {
    fn present(&self, session: SessionId, app: &AppId, kind: ChallengeKind)
    -> Result<(), PresentError>;

    /// Hiding an unknown or already-hidden session is not an error.
    fn dismiss(&self, session: SessionId);
}

/// One-way user notification channel.
pub trait NotificationSink: Send + Sync {
    fn permission_needed(&self, needed: bool);
}

type PresenterMap = HashMap<ConnectionId, mpsc::UnboundedSender<Message>>;

/// Fan-out to attached presenter connections.
#[derive(Debug, Default)]
pub struct PresenterHub {
    presenters: Mutex<PresenterMap>,
}

impl PresenterHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, conn_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.lock().insert(conn_id, tx);
        tracing::debug!(?conn_id, "presenter attached");
    }

    pub fn detach(&self, conn_id: ConnectionId) {
        if self.lock().remove(&conn_id).is_some() {
            tracing::debug!(?conn_id, "presenter detached");
        }
    }

    /// Send to every presenter, pruning closed ones. Returns the number
    /// of presenters reached.
    fn broadcast(&self, msg: &Message) -> usize {
        let mut presenters = self.lock();
        presenters.retain(|conn_id, tx| {
            let alive = tx.send(msg.clone()).is_ok();
            if !alive {
                tracing::debug!(?conn_id, "presenter channel closed");
            }
            alive
        });
        presenters.len()
    }

    fn lock(&self) -> MutexGuard<'_, PresenterMap> {
        // Every update is a single insert/remove, so a poisoned map is intact.
        self.presenters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Unsolicited `present` frame for a session.
pub fn present_frame(session: SessionId, app: &AppId, kind: ChallengeKind) -> Message {
    Message::Present {
        id: 0,
        session: session.to_string(),
        app: app.to_string(),
        kind,
    }
}

impl PresentationGateway for PresenterHub {
    fn present(
        &self,
        session: SessionId,
        app: &AppId,
        kind: ChallengeKind,
    ) -> Result<(), PresentError> {
        if self.lock().is_empty() {
            return Err(PresentError::NoPresenter);
        }
        let reached = self.broadcast(&present_frame(session, app, kind));
        if reached == 0 {
            return Err(PresentError::Disconnected);
        }
        Ok(())
    }

    fn dismiss(&self, session: SessionId) {
        self.broadcast(&Message::Dismiss {
            id: 0,
            session: session.to_string(),
        });
    }
}

impl NotificationSink for PresenterHub {
    fn permission_needed(&self, needed: bool) {
        let reached = self.broadcast(&Message::Notify {
            id: 0,
            permission_needed: needed,
        });
        if reached == 0 {
            tracing::debug!(needed, "no presenter to notify");
        }
    }
}
