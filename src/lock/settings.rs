//! Permission and preference oracles.
//!
//! Point-in-time boolean reads, consulted at session creation (overlay
//! permission, strong-challenge preference) and on every sampling tick
//! (usage access).

use std::sync::atomic::{AtomicBool, Ordering};

/// Permission grants the daemon depends on.
pub trait PermissionOracle: Send + Sync {
    /// Whether an overlay may be drawn above other applications.
    fn has_overlay_permission(&self) -> bool;

    /// Whether the foreground-identity source may be queried.
    fn has_usage_access(&self) -> bool;
}

/// User preferences relevant to challenge selection.
pub trait PreferenceStore: Send + Sync {
    /// Always use the full-screen (pattern or biometric) challenge.
    fn strong_challenge_preferred(&self) -> bool;
}

/// Atomically updated flags backing both oracles.
///
/// Written by the control socket handler, read by the lock manager and
/// the sampler task.
#[derive(Debug)]
pub struct SharedSettings {
    overlay: AtomicBool,
    usage_access: AtomicBool,
    strong_challenge: AtomicBool,
}

impl SharedSettings {
    pub fn new(overlay: bool, usage_access: bool, strong_challenge: bool) -> Self {
        Self {
            overlay: AtomicBool::new(overlay),
            usage_access: AtomicBool::new(usage_access),
            strong_challenge: AtomicBool::new(strong_challenge),
        }
    }

    pub fn set_permissions(&self, overlay: bool, usage_access: bool) {
        self.overlay.store(overlay, Ordering::Relaxed);
        self.usage_access.store(usage_access, Ordering::Relaxed);
    }

    pub fn set_strong_challenge(&self, preferred: bool) {
        self.strong_challenge.store(preferred, Ordering::Relaxed);
    }

    /// True when any permission the daemon needs is missing.
    pub fn permission_needed(&self) -> bool {
        !(self.has_overlay_permission() && self.has_usage_access())
    }
}

impl Default for SharedSettings {
    /// Overlay and usage access granted, strong challenge off.
    fn default() -> Self {
        Self::new(true, true, false)
    }
}

impl PermissionOracle for SharedSettings {
    fn has_overlay_permission(&self) -> bool {
        self.overlay.load(Ordering::Relaxed)
    }

    fn has_usage_access(&self) -> bool {
        self.usage_access.load(Ordering::Relaxed)
    }
}

impl PreferenceStore for SharedSettings {
    fn strong_challenge_preferred(&self) -> bool {
        self.strong_challenge.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_needed_tracks_both_grants() {
        let s = SharedSettings::default();
        assert!(!s.permission_needed());
        s.set_permissions(false, true);
        assert!(s.permission_needed());
        s.set_permissions(true, false);
        assert!(s.permission_needed());
        s.set_permissions(true, true);
        assert!(!s.permission_needed());
    }

    #[test]
    fn strong_challenge_toggle() {
        let s = SharedSettings::default();
        assert!(!s.strong_challenge_preferred());
        s.set_strong_challenge(true);
        assert!(s.strong_challenge_preferred());
    }
}
