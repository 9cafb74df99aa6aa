//! Effect executor.
//!
//! Effects are queued by the daemon loop and executed here, off the
//! loop, in the order they were produced. A failed presentation is fed
//! back to the loop as [`LockInput::PresentationFailed`]; it is never
//! handled inline.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lock::LockInput;
use crate::model::Effect;

use super::gateway::{NotificationSink, PresentationGateway};

/// Spawn the executor task. It runs until `effects` closes.
pub fn spawn_executor(
    effects: mpsc::UnboundedReceiver<Effect>,
    gateway: Arc<dyn PresentationGateway>,
    notifier: Arc<dyn NotificationSink>,
    feedback: mpsc::UnboundedSender<LockInput>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_executor(effects, gateway, notifier, feedback))
}

async fn run_executor(
    mut effects: mpsc::UnboundedReceiver<Effect>,
    gateway: Arc<dyn PresentationGateway>,
    notifier: Arc<dyn NotificationSink>,
    feedback: mpsc::UnboundedSender<LockInput>,
) {
    while let Some(effect) = effects.recv().await {
        match effect {
            Effect::Present { session, app, kind } => {
                if let Err(e) = gateway.present(session, &app, kind) {
                    tracing::warn!(%session, %app, error = %e, "presentation failed");
                    if feedback.send(LockInput::PresentationFailed(session)).is_err() {
                        break;
                    }
                }
            }
            Effect::Dismiss { session } => gateway.dismiss(session),
            Effect::PermissionNeeded(needed) => notifier.permission_needed(needed),
        }
    }
    tracing::debug!("effect executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::gateway::PresentError;
    use crate::model::{AppId, ChallengeKind, SessionId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_present: bool,
    }

    impl PresentationGateway for Recorder {
        fn present(
            &self,
            _session: SessionId,
            app: &AppId,
            kind: ChallengeKind,
        ) -> Result<(), PresentError> {
            self.calls.lock().unwrap().push(format!("present {app} {kind}"));
            if self.fail_present {
                Err(PresentError::NoPresenter)
            } else {
                Ok(())
            }
        }

        fn dismiss(&self, _session: SessionId) {
            self.calls.lock().unwrap().push("dismiss".into());
        }
    }

    impl NotificationSink for Recorder {
        fn permission_needed(&self, needed: bool) {
            self.calls.lock().unwrap().push(format!("notify {needed}"));
        }
    }

    #[tokio::test]
    async fn executes_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let (feedback_tx, mut feedback_rx) = mpsc::unbounded_channel();
        let handle = spawn_executor(
            effect_rx,
            recorder.clone(),
            recorder.clone(),
            feedback_tx,
        );

        let session = SessionId::new();
        effect_tx
            .send(Effect::Present {
                session,
                app: AppId::from("org.bank"),
                kind: ChallengeKind::Overlay,
            })
            .unwrap();
        effect_tx.send(Effect::PermissionNeeded(true)).unwrap();
        effect_tx.send(Effect::Dismiss { session }).unwrap();
        drop(effect_tx);
        handle.await.unwrap();

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            ["present org.bank overlay", "notify true", "dismiss"]
        );
        assert!(feedback_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_present_is_fed_back() {
        let recorder = Arc::new(Recorder {
            fail_present: true,
            ..Recorder::default()
        });
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let (feedback_tx, mut feedback_rx) = mpsc::unbounded_channel();
        let handle = spawn_executor(
            effect_rx,
            recorder.clone(),
            recorder.clone(),
            feedback_tx,
        );

        let session = SessionId::new();
        effect_tx
            .send(Effect::Present {
                session,
                app: AppId::from("org.bank"),
                kind: ChallengeKind::FullScreenChallenge,
            })
            .unwrap();
        drop(effect_tx);
        handle.await.unwrap();

        match feedback_rx.try_recv().unwrap() {
            LockInput::PresentationFailed(id) => assert_eq!(id, session),
            other => panic!("expected PresentationFailed, got {other:?}"),
        }
    }
}
