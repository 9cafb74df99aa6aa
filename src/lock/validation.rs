//! Validation bridge: challenge outcomes into the lock loop.
//!
//! Outcomes arrive either as an opaque result from the challenge UI
//! (`report`) or as a drawn pattern that is compared here against the
//! latest stored pattern. The comparison is a join over the most recent
//! value of each feed: an attempt drawn before any stored pattern has
//! arrived is held and compared once one does, provided the session it
//! was drawn for is still the pending one.

use tokio::sync::mpsc;

use crate::model::{SessionId, ValidationResult};

use super::manager::LockInput;

/// An attempt waiting for the first stored pattern.
#[derive(Debug)]
struct HeldAttempt {
    drawn: Vec<u8>,
    session: SessionId,
}

#[derive(Debug)]
pub struct ValidationBridge {
    inputs: mpsc::UnboundedSender<LockInput>,
    stored: Option<Vec<u8>>,
    held_attempt: Option<HeldAttempt>,
}

impl ValidationBridge {
    pub fn new(inputs: mpsc::UnboundedSender<LockInput>) -> Self {
        Self {
            inputs,
            stored: None,
            held_attempt: None,
        }
    }

    /// Forward an outcome to the lock loop.
    ///
    /// A result with no pending session is dropped by the manager, not
    /// here: the bridge cannot know whether the session already expired.
    pub fn report(&self, result: ValidationResult) {
        if self.inputs.send(LockInput::Validation(result)).is_err() {
            tracing::debug!(success = result.success, "lock loop gone, validation result dropped");
        }
    }

    /// Latest stored pattern from the persistence feed.
    ///
    /// `pending` is the session pending right now. A held attempt is
    /// compared only if it was drawn for that same session.
    pub fn set_stored_pattern(&mut self, pattern: Vec<u8>, pending: Option<SessionId>) {
        self.stored = Some(pattern);
        let Some(attempt) = self.held_attempt.take() else {
            return;
        };
        if pending == Some(attempt.session) {
            tracing::debug!(session = %attempt.session, "comparing attempt held until pattern arrived");
            self.compare(&attempt.drawn);
        } else {
            tracing::debug!(session = %attempt.session, "held attempt outlived its session, discarded");
        }
    }

    /// A pattern drawn on the challenge surface while `pending` is the
    /// pending session.
    ///
    /// Returns the comparison outcome, or `None` while no stored
    /// pattern is known. Such an attempt is held for its session; with
    /// no pending session there is nothing to hold it for.
    pub fn submit_attempt(&mut self, drawn: Vec<u8>, pending: Option<SessionId>) -> Option<bool> {
        if self.stored.is_none() {
            self.held_attempt = match pending {
                Some(session) => {
                    tracing::debug!(%session, "no stored pattern yet, holding attempt");
                    Some(HeldAttempt { drawn, session })
                }
                None => {
                    tracing::debug!("no stored pattern and no pending session, attempt dropped");
                    None
                }
            };
            return None;
        }
        Some(self.compare(&drawn))
    }

    #[cfg(test)]
    pub fn has_stored_pattern(&self) -> bool {
        self.stored.is_some()
    }

    fn compare(&self, drawn: &[u8]) -> bool {
        let success = !drawn.is_empty() && self.stored.as_deref() == Some(drawn);
        self.report(ValidationResult { success });
        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> (ValidationBridge, mpsc::UnboundedReceiver<LockInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ValidationBridge::new(tx), rx)
    }

    fn next_result(rx: &mut mpsc::UnboundedReceiver<LockInput>) -> Option<bool> {
        match rx.try_recv() {
            Ok(LockInput::Validation(result)) => Some(result.success),
            Ok(other) => panic!("unexpected input {other:?}"),
            Err(_) => None,
        }
    }

    #[test]
    fn report_forwards_outcome() {
        let (b, mut rx) = bridge();
        b.report(ValidationResult { success: true });
        assert_eq!(next_result(&mut rx), Some(true));
    }

    #[test]
    fn matching_attempt_succeeds() {
        let (mut b, mut rx) = bridge();
        b.set_stored_pattern(vec![0, 1, 2, 5, 8], None);
        assert_eq!(b.submit_attempt(vec![0, 1, 2, 5, 8], None), Some(true));
        assert_eq!(next_result(&mut rx), Some(true));
    }

    #[test]
    fn wrong_attempt_fails() {
        let (mut b, mut rx) = bridge();
        b.set_stored_pattern(vec![0, 1, 2], None);
        assert_eq!(b.submit_attempt(vec![2, 1, 0], None), Some(false));
        assert_eq!(next_result(&mut rx), Some(false));
    }

    #[test]
    fn empty_attempt_never_matches() {
        let (mut b, mut rx) = bridge();
        b.set_stored_pattern(Vec::new(), None);
        assert_eq!(b.submit_attempt(Vec::new(), None), Some(false));
        assert_eq!(next_result(&mut rx), Some(false));
    }

    #[test]
    fn attempt_before_pattern_is_held_for_its_session() {
        let (mut b, mut rx) = bridge();
        let session = SessionId::new();
        assert_eq!(b.submit_attempt(vec![3, 4, 5], Some(session)), None);
        assert_eq!(next_result(&mut rx), None);

        b.set_stored_pattern(vec![3, 4, 5], Some(session));
        assert_eq!(next_result(&mut rx), Some(true));
        assert!(b.has_stored_pattern());
    }

    #[test]
    fn held_attempt_is_discarded_when_session_changed() {
        let (mut b, mut rx) = bridge();
        b.submit_attempt(vec![3, 4, 5], Some(SessionId::new()));

        b.set_stored_pattern(vec![3, 4, 5], Some(SessionId::new()));
        assert_eq!(next_result(&mut rx), None);
    }

    #[test]
    fn held_attempt_is_discarded_when_session_ended() {
        let (mut b, mut rx) = bridge();
        b.submit_attempt(vec![3, 4, 5], Some(SessionId::new()));

        b.set_stored_pattern(vec![3, 4, 5], None);
        assert_eq!(next_result(&mut rx), None);
    }

    #[test]
    fn attempt_without_session_is_not_held() {
        let (mut b, mut rx) = bridge();
        assert_eq!(b.submit_attempt(vec![1, 2, 3], None), None);

        // A session that starts later must not inherit the attempt.
        b.set_stored_pattern(vec![1, 2, 3], Some(SessionId::new()));
        assert_eq!(next_result(&mut rx), None);
    }

    #[test]
    fn pattern_update_uses_latest_value() {
        let (mut b, mut rx) = bridge();
        b.set_stored_pattern(vec![1, 2, 3], None);
        b.set_stored_pattern(vec![4, 5, 6], None);
        assert_eq!(b.submit_attempt(vec![1, 2, 3], None), Some(false));
        assert_eq!(b.submit_attempt(vec![4, 5, 6], None), Some(true));
        assert_eq!(next_result(&mut rx), Some(false));
        assert_eq!(next_result(&mut rx), Some(true));
    }

    #[test]
    fn pattern_update_does_not_revalidate_old_attempt() {
        let (mut b, mut rx) = bridge();
        let session = Some(SessionId::new());
        b.set_stored_pattern(vec![1], session);
        b.submit_attempt(vec![2], session);
        next_result(&mut rx);
        b.set_stored_pattern(vec![2], session);
        assert_eq!(next_result(&mut rx), None);
    }

    #[test]
    fn report_after_loop_gone_is_silent() {
        let (b, rx) = bridge();
        drop(rx);
        b.report(ValidationResult { success: true });
    }
}
