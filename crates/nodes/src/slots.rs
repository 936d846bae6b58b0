//! Shared in-process slot bookkeeping for `condition.slot_available` /
//! `action.allocate_slot` / `action.release_slot`. The engine itself has
//! no notion of "concurrency slots" outside this node triad — it's purely
//! a counter keyed by resource name, scoped to one process.

use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct SlotRegistry {
    in_use: Arc<DashMap<String, usize>>,
}

impl SlotRegistry {
    /// Returns `(hasRoom, currentInUse)` for `resource` against `capacity`.
    #[must_use]
    pub fn available(&self, resource: &str, capacity: usize) -> (bool, usize) {
        let in_use = self.in_use.get(resource).map(|v| *v).unwrap_or(0);
        (in_use < capacity, in_use)
    }

    /// Increments the in-use count if there's room, returning whether the
    /// allocation succeeded.
    #[must_use]
    pub fn allocate(&self, resource: &str, capacity: usize) -> bool {
        let mut entry = self.in_use.entry(resource.to_string()).or_insert(0);
        if *entry < capacity {
            *entry += 1;
            true
        } else {
            false
        }
    }

    /// Decrements the in-use count, saturating at zero.
    pub fn release(&self, resource: &str) {
        if let Some(mut entry) = self.in_use.get_mut(resource) {
            *entry = entry.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_respects_capacity() {
        let registry = SlotRegistry::default();
        assert!(registry.allocate("worktrees", 1));
        assert!(!registry.allocate("worktrees", 1));
        registry.release("worktrees");
        assert!(registry.allocate("worktrees", 1));
    }

    #[test]
    fn available_reports_room_without_mutating() {
        let registry = SlotRegistry::default();
        registry.allocate("x", 2);
        let (room, in_use) = registry.available("x", 2);
        assert!(room);
        assert_eq!(in_use, 1);
    }
}
