//! Named-boolean permission set with aggregated change notification.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::broadcast;

/// A capability a backend can grant or revoke at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    Read,
    Edit,
    Add,
    Delete,
    Save,
    Login,
    Logout,
}

/// One aggregated notification per [`PermissionSet::apply`] call.
#[derive(Debug, Clone)]
pub struct PermissionChange {
    /// Exactly the keys whose value changed, sorted.
    pub changed: Vec<Permission>,
    /// Full snapshot after the mutation.
    pub set: HashMap<Permission, bool>,
}

/// Shared permission state for one backend instance.
///
/// Mutations are merges: keys absent from an update keep their prior value,
/// and a single event is emitted per call listing only the keys that
/// actually changed.
#[derive(Debug, Clone)]
pub struct PermissionSet {
    inner: Arc<RwLock<HashMap<Permission, bool>>>,
    events: broadcast::Sender<PermissionChange>,
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionSet {
    /// Empty set: every permission reads as `false` until granted.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Set with initial grants, emitting no event.
    pub fn with_granted(granted: &[Permission]) -> Self {
        let set = Self::new();
        {
            let mut inner = set.inner.write().expect("permission lock poisoned");
            for p in granted {
                inner.insert(*p, true);
            }
        }
        set
    }

    /// Whether `permission` is currently granted.
    pub fn can(&self, permission: Permission) -> bool {
        self.inner
            .read()
            .expect("permission lock poisoned")
            .get(&permission)
            .copied()
            .unwrap_or(false)
    }

    /// Current state of every permission that has ever been set.
    pub fn snapshot(&self) -> HashMap<Permission, bool> {
        self.inner.read().expect("permission lock poisoned").clone()
    }

    /// Merge `updates` into the set.
    ///
    /// Returns the keys that actually changed (sorted). Emits one
    /// [`PermissionChange`] when that list is non-empty, none otherwise.
    pub fn apply(&self, updates: &[(Permission, bool)]) -> Vec<Permission> {
        let (changed, set) = {
            let mut inner = self.inner.write().expect("permission lock poisoned");
            let mut changed = Vec::new();
            for (permission, value) in updates {
                let prior = inner.get(permission).copied().unwrap_or(false);
                if prior != *value {
                    inner.insert(*permission, *value);
                    changed.push(*permission);
                }
            }
            changed.sort();
            (changed, inner.clone())
        };
        if !changed.is_empty() {
            let _ = self.events.send(PermissionChange {
                changed: changed.clone(),
                set,
            });
        }
        changed
    }

    /// Subscribe to aggregated change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionChange> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_reports_only_changed_keys() {
        let set = PermissionSet::with_granted(&[Permission::Read]);
        let changed = set.apply(&[
            (Permission::Edit, true),
            (Permission::Save, true),
            (Permission::Read, true),
        ]);
        assert_eq!(changed, vec![Permission::Edit, Permission::Save]);
        assert!(set.can(Permission::Read));
    }

    #[test]
    fn apply_is_a_merge() {
        let set = PermissionSet::with_granted(&[Permission::Read, Permission::Login]);
        set.apply(&[(Permission::Login, false), (Permission::Logout, true)]);
        assert!(set.can(Permission::Read));
        assert!(!set.can(Permission::Login));
        assert!(set.can(Permission::Logout));
    }

    #[tokio::test]
    async fn one_event_per_apply_call() {
        let set = PermissionSet::new();
        let mut rx = set.subscribe();

        set.apply(&[(Permission::Edit, true), (Permission::Save, true)]);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.changed, vec![Permission::Edit, Permission::Save]);
        assert_eq!(event.set.get(&Permission::Edit), Some(&true));

        // No-op update emits nothing.
        set.apply(&[(Permission::Edit, true)]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ungranted_permission_reads_false() {
        let set = PermissionSet::new();
        assert!(!set.can(Permission::Delete));
    }

    #[test]
    fn permission_round_trips_through_strings() {
        use std::str::FromStr;
        assert_eq!(Permission::Edit.to_string(), "edit");
        assert_eq!(Permission::from_str("logout").unwrap(), Permission::Logout);
    }
}
