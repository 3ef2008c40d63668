use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
};

use basalt_events::PlayerName;

/// Names changed by one reconciliation pass, for logging.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    pub added: Vec<PlayerName>,
    pub removed: Vec<PlayerName>,
}

impl ReconcileDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set of players currently believed online.
///
/// Mutated by the event path (join/leave handlers) and by the reconciliation
/// pass, which may run concurrently; every mutation is a single critical
/// section behind one mutex. `add`/`remove` report whether membership
/// actually changed so callers can suppress duplicate notifications.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    inner: Mutex<HashSet<PlayerName>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PlayerName>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns true if the name was newly inserted.
    pub fn add(&self, name: PlayerName) -> bool {
        self.lock().insert(name)
    }

    /// Returns true if the name was present.
    pub fn remove(&self, name: &PlayerName) -> bool {
        self.lock().remove(name)
    }

    pub fn contains(&self, name: &PlayerName) -> bool {
        self.lock().contains(name)
    }

    pub fn snapshot(&self) -> Vec<PlayerName> {
        let mut out: Vec<PlayerName> = self.lock().iter().cloned().collect();
        out.sort();
        out
    }

    /// Corrects the registry against independently derived ground truth:
    /// tracked names absent from truth are removed, truth names missing from
    /// the registry are added. Additions here are silent — the real join
    /// event was presumably already delivered or predates this process.
    pub fn reconcile(&self, truth: &HashSet<PlayerName>) -> ReconcileDelta {
        let mut set = self.lock();
        let mut delta = ReconcileDelta::default();

        delta.removed = set.iter().filter(|n| !truth.contains(n)).cloned().collect();
        for name in &delta.removed {
            set.remove(name);
        }

        for name in truth {
            if set.insert(name.clone()) {
                delta.added.push(name.clone());
            }
        }

        delta.added.sort();
        delta.removed.sort();
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PlayerName {
        PlayerName::new(s)
    }

    #[test]
    fn add_then_remove_round_trip() {
        let reg = PlayerRegistry::new();
        assert!(reg.add(name("Alice")));
        assert!(reg.contains(&name("Alice")));
        assert!(reg.remove(&name("Alice")));
        assert!(!reg.contains(&name("Alice")));
    }

    #[test]
    fn duplicate_add_is_suppressed() {
        let reg = PlayerRegistry::new();
        assert!(reg.add(name("Bob")));
        assert!(!reg.add(name("Bob")));
        assert_eq!(reg.snapshot(), vec![name("Bob")]);
    }

    #[test]
    fn remove_of_absent_name_reports_false() {
        let reg = PlayerRegistry::new();
        assert!(!reg.remove(&name("Ghost")));
    }

    #[test]
    fn membership_follows_last_applied_operation() {
        let reg = PlayerRegistry::new();
        reg.add(name("Alice"));
        reg.add(name("Bob"));
        reg.remove(&name("Alice"));
        reg.add(name("Alice"));
        reg.remove(&name("Bob"));

        assert_eq!(reg.snapshot(), vec![name("Alice")]);
    }

    #[test]
    fn reconcile_removes_stale_and_adds_missing() {
        let reg = PlayerRegistry::new();
        reg.add(name("Stale"));
        reg.add(name("Kept"));

        let truth: HashSet<PlayerName> = [name("Kept"), name("New")].into_iter().collect();
        let delta = reg.reconcile(&truth);

        assert_eq!(delta.removed, vec![name("Stale")]);
        assert_eq!(delta.added, vec![name("New")]);
        assert_eq!(reg.snapshot(), vec![name("Kept"), name("New")]);
    }

    #[test]
    fn reconcile_against_matching_truth_is_a_no_op() {
        let reg = PlayerRegistry::new();
        reg.add(name("Alice"));

        let truth: HashSet<PlayerName> = [name("Alice")].into_iter().collect();
        assert!(reg.reconcile(&truth).is_empty());
        assert_eq!(reg.snapshot(), vec![name("Alice")]);
    }
}
