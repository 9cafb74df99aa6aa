//! Shared data model: identifiers, sessions, events, and effects.
//!
//! Events (`ForegroundEvent`, `ScreenPower`, `ValidationResult`) are
//! ephemeral and consumed once by the lock loop. [`Session`] is the only
//! entity with a multi-step lifecycle and is owned by
//! [`crate::lock::LockSessionManager`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Application identifier (window class, process name, package name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AppId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque session token.
///
/// Random (UUID v4), so two sessions for the same app created at
/// different times never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which challenge surface a session uses. Fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Pattern overlay drawn above the protected app.
    Overlay,
    /// Separate full-screen challenge surface (pattern or biometric).
    FullScreenChallenge,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlay => f.write_str("overlay"),
            Self::FullScreenChallenge => f.write_str("full_screen"),
        }
    }
}

/// Lifecycle phase reported for the lock machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Pending,
    Cooldown,
}

/// An in-flight challenge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub target_app: AppId,
    pub created_at: Instant,
    pub kind: ChallengeKind,
}

/// A change of foreground application, as emitted by the sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundEvent {
    pub app: AppId,
    pub observed_at: Instant,
}

/// Screen power broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenPower {
    On,
    Off,
}

/// Outcome of a presented challenge. Correlates implicitly to the one
/// pending session, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    pub success: bool,
}

/// Side effect requested by the lock machine, executed outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Present {
        session: SessionId,
        app: AppId,
        kind: ChallengeKind,
    },
    Dismiss {
        session: SessionId,
    },
    PermissionNeeded(bool),
}

/// Point-in-time snapshot for the `status` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub phase: SessionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChallengeKind>,
    pub protected: u32,
    pub sampling: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_distinct() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn app_id_display_is_raw_identifier() {
        assert_eq!(AppId::from("firefox").to_string(), "firefox");
    }

    #[test]
    fn lock_status_omits_empty_fields() {
        let status = LockStatus {
            phase: SessionPhase::Idle,
            app: None,
            session: None,
            kind: None,
            protected: 3,
            sampling: true,
        };
        let encoded = rmp_serde::to_vec_named(&status).unwrap();
        let decoded: LockStatus = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(decoded, status);
    }
}
