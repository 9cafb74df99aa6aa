//! Daemon state: lock manager, validation bridge, connection roles.
//!
//! Owned exclusively by the daemon loop. No concurrent access except
//! through [`SharedSettings`], whose atomics are also read by the
//! sampler.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ipc::protocol::Role;
use crate::lock::{LockSessionManager, SharedSettings, ValidationBridge};
use crate::model::Effect;

/// Unique identifier for a client connection.
///
/// Monotonically increasing counter. Used to route unsolicited frames
/// to presenter connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct DaemonState {
    pub manager: LockSessionManager,
    pub bridge: ValidationBridge,
    settings: Arc<SharedSettings>,
    connections: HashMap<ConnectionId, Role>,
    /// Last "permission needed" value announced to presenters.
    permission_needed: bool,
    /// Whether a sampling task is currently running.
    pub sampling: bool,
}

impl DaemonState {
    pub fn new(
        manager: LockSessionManager,
        bridge: ValidationBridge,
        settings: Arc<SharedSettings>,
    ) -> Self {
        let permission_needed = settings.permission_needed();
        Self {
            manager,
            bridge,
            settings,
            connections: HashMap::new(),
            permission_needed,
            sampling: false,
        }
    }

    pub fn add_connection(&mut self, id: ConnectionId, role: Role) {
        self.connections.insert(id, role);
    }

    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    #[cfg(test)]
    pub fn role(&self, id: ConnectionId) -> Option<Role> {
        self.connections.get(&id).copied()
    }

    /// Update permission grants. Returns a notification effect only when
    /// the derived "permission needed" flag changes.
    pub fn update_permissions(&mut self, overlay: bool, usage_access: bool) -> Option<Effect> {
        self.settings.set_permissions(overlay, usage_access);
        let needed = self.settings.permission_needed();
        if needed == self.permission_needed {
            return None;
        }
        self.permission_needed = needed;
        tracing::info!(needed, overlay, usage_access, "permission state changed");
        Some(Effect::PermissionNeeded(needed))
    }

    pub fn set_strong_challenge(&self, preferred: bool) {
        self.settings.set_strong_challenge(preferred);
        tracing::debug!(preferred, "strong challenge preference updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use tokio::sync::mpsc;

    fn fresh() -> DaemonState {
        let settings = Arc::new(SharedSettings::default());
        let manager = LockSessionManager::new(
            &LockConfig::default(),
            settings.clone(),
            settings.clone(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        DaemonState::new(manager, ValidationBridge::new(tx), settings)
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn connection_roles_tracked() {
        let mut s = fresh();
        let c = ConnectionId::new();
        s.add_connection(c, Role::Presenter);
        assert_eq!(s.role(c), Some(Role::Presenter));
        s.remove_connection(c);
        assert_eq!(s.role(c), None);
    }

    #[test]
    fn permission_notification_only_on_change() {
        let mut s = fresh();
        assert_eq!(s.update_permissions(true, true), None);
        assert_eq!(
            s.update_permissions(false, true),
            Some(Effect::PermissionNeeded(true))
        );
        assert_eq!(s.update_permissions(false, false), None);
        assert_eq!(
            s.update_permissions(true, true),
            Some(Effect::PermissionNeeded(false))
        );
    }
}
