//! Protected-application set.
//!
//! Replace-on-update: every push from the persistence feed fully
//! replaces the membership, then the pinned identifiers are re-added.
//! Owned by the lock manager; a transition sees either the old or the
//! new set, never a partial one.

use std::collections::HashSet;

use crate::model::AppId;

#[derive(Debug, Clone)]
pub struct ProtectedSet {
    members: HashSet<AppId>,
    pinned: Vec<AppId>,
}

impl ProtectedSet {
    /// Create a set holding only the pinned identifiers.
    pub fn new(pinned: impl IntoIterator<Item = AppId>) -> Self {
        let pinned: Vec<AppId> = pinned.into_iter().collect();
        Self {
            members: pinned.iter().cloned().collect(),
            pinned,
        }
    }

    /// Replace the membership with `apps`, then re-add pinned identifiers.
    pub fn replace(&mut self, apps: impl IntoIterator<Item = AppId>) {
        let mut next: HashSet<AppId> = apps.into_iter().collect();
        next.extend(self.pinned.iter().cloned());
        self.members = next;
    }

    pub fn contains(&self, app: &AppId) -> bool {
        self.members.contains(app)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<AppId> {
        list.iter().map(|s| AppId::from(*s)).collect()
    }

    #[test]
    fn starts_with_pinned_only() {
        let set = ProtectedSet::new(ids(&["settings"]));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&"settings".into()));
    }

    #[test]
    fn replace_drops_previous_members() {
        let mut set = ProtectedSet::new(ids(&[]));
        set.replace(ids(&["a", "b"]));
        set.replace(ids(&["c"]));
        assert!(!set.contains(&"a".into()));
        assert!(!set.contains(&"b".into()));
        assert!(set.contains(&"c".into()));
    }

    #[test]
    fn pinned_survive_every_replace() {
        let mut set = ProtectedSet::new(ids(&["settings"]));
        set.replace(ids(&["a"]));
        assert!(set.contains(&"settings".into()));
        set.replace(Vec::new());
        assert!(set.contains(&"settings".into()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn redelivery_of_same_set_is_idempotent() {
        let mut set = ProtectedSet::new(ids(&["settings"]));
        set.replace(ids(&["a", "settings"]));
        set.replace(ids(&["a", "settings"]));
        assert_eq!(set.len(), 2);
    }
}
