//! Lock session state machine.
//!
//! All methods are pure state transitions with no I/O: callers pass
//! the current instant and execute the returned [`Effect`]s. Owned
//! exclusively by the daemon loop, so transitions are serialized.
//!
//! States: `Idle`, `Pending(session)`, `Cooldown(app, until)`. Before
//! every input the machine first catches up on elapsed deadlines, so a
//! late timer never lets an expired session swallow a fresh event.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LockConfig;
use crate::model::{
    AppId, ChallengeKind, Effect, ForegroundEvent, LockStatus, ScreenPower, Session, SessionId,
    SessionPhase, ValidationResult,
};

use super::protected::ProtectedSet;
use super::settings::{PermissionOracle, PreferenceStore};

/// Inputs accepted by [`LockSessionManager::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockInput {
    Foreground(ForegroundEvent),
    Power(ScreenPower),
    Validation(ValidationResult),
    /// The gateway could not show the challenge for this session.
    PresentationFailed(SessionId),
    /// Full replacement of the protected set from the persistence feed.
    ProtectedApps(Vec<AppId>),
}

#[derive(Debug, Clone)]
enum LockState {
    Idle,
    Pending(Session),
    Cooldown { app: AppId, until: Instant },
}

pub struct LockSessionManager {
    state: LockState,
    protected: ProtectedSet,
    /// Most recent foreground identifier, re-evaluated when a cooldown ends.
    last_foreground: Option<AppId>,
    self_id: AppId,
    session_timeout: Duration,
    cooldown: Duration,
    permissions: Arc<dyn PermissionOracle>,
    preferences: Arc<dyn PreferenceStore>,
}

impl LockSessionManager {
    pub fn new(
        config: &LockConfig,
        permissions: Arc<dyn PermissionOracle>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            state: LockState::Idle,
            protected: ProtectedSet::new(config.pinned_apps.iter().cloned().map(AppId::from)),
            last_foreground: None,
            self_id: AppId::new(config.self_id.clone()),
            session_timeout: config.session_timeout,
            cooldown: config.cooldown,
            permissions,
            preferences,
        }
    }

    /// Apply one input and return the effects to execute, in order.
    pub fn handle(&mut self, input: LockInput, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let cooled = self.expire(now, &mut effects);
        // A foreground event evaluates its own app; a power change resets.
        let recheck = cooled && !matches!(input, LockInput::Foreground(_) | LockInput::Power(_));

        match input {
            LockInput::Foreground(event) => self.on_foreground(event.app, now, &mut effects),
            LockInput::Power(power) => self.on_power(power, &mut effects),
            LockInput::Validation(result) => self.on_validation(result, &mut effects),
            LockInput::PresentationFailed(session) => {
                self.on_presentation_failed(session, now, &mut effects)
            }
            LockInput::ProtectedApps(apps) => self.on_protected_apps(apps, &mut effects),
        }

        if recheck {
            self.recheck_foreground(now, &mut effects);
        }
        effects
    }

    /// Advance timers. Called when [`next_deadline`](Self::next_deadline)
    /// elapses.
    ///
    /// When a cooldown ends, the last observed foreground app is
    /// evaluated again: the sampler does not re-emit an unchanged
    /// identifier, so an app that stayed in front would otherwise stay
    /// unlocked.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.expire(now, &mut effects) {
            self.recheck_foreground(now, &mut effects);
        }
        effects
    }

    /// The next instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            LockState::Idle => None,
            LockState::Pending(session) => Some(session.created_at + self.session_timeout),
            LockState::Cooldown { until, .. } => Some(*until),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            LockState::Idle => SessionPhase::Idle,
            LockState::Pending(_) => SessionPhase::Pending,
            LockState::Cooldown { .. } => SessionPhase::Cooldown,
        }
    }

    /// The active session, if one is pending.
    pub fn pending_session(&self) -> Option<&Session> {
        match &self.state {
            LockState::Pending(session) => Some(session),
            _ => None,
        }
    }

    pub fn status(&self, sampling: bool) -> LockStatus {
        let (app, session, kind) = match &self.state {
            LockState::Idle => (None, None, None),
            LockState::Pending(s) => (
                Some(s.target_app.to_string()),
                Some(s.id.to_string()),
                Some(s.kind),
            ),
            LockState::Cooldown { app, .. } => (Some(app.to_string()), None, None),
        };
        LockStatus {
            phase: self.phase(),
            app,
            session,
            kind,
            protected: u32::try_from(self.protected.len()).unwrap_or(u32::MAX),
            sampling,
        }
    }

    // -- Transitions --

    fn on_foreground(&mut self, app: AppId, now: Instant, effects: &mut Vec<Effect>) {
        self.last_foreground = Some(app.clone());

        // Returning to the controlling app mid-challenge is not a bypass:
        // release the session without cooldown. Never lock it.
        if app == self.self_id {
            if let LockState::Pending(session) = &self.state {
                tracing::info!(session = %session.id, app = %session.target_app, "controlling app in front, session released");
                self.release(effects);
            }
            return;
        }

        match &self.state {
            LockState::Pending(session) if session.target_app == app => {
                tracing::debug!(app = %app, session = %session.id, "duplicate foreground event for pending session");
                return;
            }
            LockState::Pending(session) => {
                tracing::info!(
                    session = %session.id,
                    from = %session.target_app,
                    to = %app,
                    "switched away before challenge completed, session abandoned"
                );
                self.release(effects);
            }
            LockState::Cooldown { app: cooling, .. } if *cooling == app => {
                tracing::debug!(app = %app, "foreground event suppressed by cooldown");
                return;
            }
            LockState::Cooldown { .. } | LockState::Idle => {}
        }

        self.evaluate(app, now, effects);
    }

    fn on_power(&mut self, power: ScreenPower, effects: &mut Vec<Effect>) {
        tracing::info!(?power, phase = ?self.phase(), "screen power change, resetting lock state");
        if matches!(self.state, LockState::Pending(_)) {
            self.release(effects);
        }
        self.state = LockState::Idle;
        self.last_foreground = None;
    }

    fn on_validation(&mut self, result: ValidationResult, effects: &mut Vec<Effect>) {
        let LockState::Pending(session) = &self.state else {
            tracing::debug!(success = result.success, "validation result without pending session ignored");
            return;
        };
        if result.success {
            tracing::info!(session = %session.id, app = %session.target_app, "challenge passed");
            self.release(effects);
        } else {
            tracing::info!(session = %session.id, app = %session.target_app, "challenge failed, retry allowed");
        }
    }

    fn on_presentation_failed(
        &mut self,
        failed: SessionId,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        let LockState::Pending(session) = &self.state else {
            tracing::debug!(session = %failed, "presentation failure for inactive session ignored");
            return;
        };
        if session.id != failed {
            tracing::debug!(session = %failed, active = %session.id, "presentation failure for stale session ignored");
            return;
        }
        tracing::warn!(session = %session.id, app = %session.target_app, "challenge could not be presented, cooling down");
        let app = session.target_app.clone();
        effects.push(Effect::Dismiss { session: failed });
        self.state = LockState::Cooldown {
            app,
            until: now + self.cooldown,
        };
    }

    fn on_protected_apps(&mut self, apps: Vec<AppId>, effects: &mut Vec<Effect>) {
        self.protected.replace(apps);
        tracing::debug!(count = self.protected.len(), "protected set replaced");

        if let LockState::Pending(session) = &self.state
            && !self.protected.contains(&session.target_app)
        {
            tracing::info!(session = %session.id, app = %session.target_app, "target no longer protected, session released");
            self.release(effects);
        }
    }

    /// Evaluate the last observed foreground app again after a cooldown.
    fn recheck_foreground(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if let Some(app) = self.last_foreground.clone() {
            self.evaluate(app, now, effects);
        }
    }

    /// Create a session for `app` if it is protected and not suppressed.
    fn evaluate(&mut self, app: AppId, now: Instant, effects: &mut Vec<Effect>) {
        if app == self.self_id || !self.protected.contains(&app) {
            return;
        }
        match &self.state {
            LockState::Pending(_) => return,
            LockState::Cooldown { app: cooling, .. } if *cooling == app => return,
            LockState::Cooldown { .. } | LockState::Idle => {}
        }

        let kind = self.choose_kind();
        let session = Session {
            id: SessionId::new(),
            target_app: app.clone(),
            created_at: now,
            kind,
        };
        tracing::info!(session = %session.id, app = %app, %kind, "locking protected app");
        effects.push(Effect::Present {
            session: session.id,
            app,
            kind,
        });
        self.state = LockState::Pending(session);
    }

    /// Overlay needs the permission and the strong preference unset.
    fn choose_kind(&self) -> ChallengeKind {
        if self.permissions.has_overlay_permission() && !self.preferences.strong_challenge_preferred()
        {
            ChallengeKind::Overlay
        } else {
            ChallengeKind::FullScreenChallenge
        }
    }

    /// Pending → Idle with a dismiss effect. No-op in other states.
    fn release(&mut self, effects: &mut Vec<Effect>) {
        if let LockState::Pending(session) = std::mem::replace(&mut self.state, LockState::Idle) {
            effects.push(Effect::Dismiss {
                session: session.id,
            });
        }
    }

    /// Catch up on elapsed deadlines. Returns `true` if a cooldown ended.
    fn expire(&mut self, now: Instant, effects: &mut Vec<Effect>) -> bool {
        if let LockState::Pending(session) = &self.state {
            let expires_at = session.created_at + self.session_timeout;
            if now >= expires_at {
                tracing::info!(session = %session.id, app = %session.target_app, "session expired without result, cooling down");
                let app = session.target_app.clone();
                effects.push(Effect::Dismiss {
                    session: session.id,
                });
                self.state = LockState::Cooldown {
                    app,
                    until: expires_at + self.cooldown,
                };
            }
        }

        if let LockState::Cooldown { app, until } = &self.state
            && now >= *until
        {
            tracing::debug!(app = %app, "cooldown elapsed");
            self.state = LockState::Idle;
            return true;
        }
        false
    }
}
