//! Account pool sharding
//!
//! A large target list is split across `num_accounts` credential slots with a
//! deterministic modulo rule, so independent processes configured with the
//! same ordered list each recompute the same partition and only crawl their
//! own share. Sessions are authenticated lazily per slot by [`SessionPool`].

mod credentials;
mod pool;

pub use credentials::{
    ChainedCredentials, ConfigCredentials, CredentialSource, EnvCredentials, ENV_PREFIX,
};
pub use pool::SessionPool;

use std::collections::BTreeMap;
use std::fmt;

/// Offset used by the secondary pool so its keys never collide with the
/// primary pool's
pub const SECONDARY_OFFSET: usize = 10;

/// Key of one shard in the slot map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(pub usize);

impl SlotKey {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list_account_{}", self.0)
    }
}

/// Slot that owns the item at `position` of the ordered list
pub fn slot_for(position: usize, num_accounts: usize, offset: usize) -> SlotKey {
    SlotKey((position + 1) % num_accounts.max(1) + offset)
}

/// Assigns `targets[i]` to slot `((i + 1) mod num_accounts) + offset`
///
/// Relative order is preserved within each slot. A `num_accounts` of zero is
/// treated as one.
///
/// # Example
///
/// ```
/// use social_harvest::accounts::{distribute, SlotKey};
///
/// let slots = distribute(&["A", "B", "C", "D", "E"], 2, 0);
/// assert_eq!(slots[&SlotKey(1)], vec!["A", "C", "E"]);
/// assert_eq!(slots[&SlotKey(0)], vec!["B", "D"]);
/// ```
pub fn distribute<T: Clone>(
    targets: &[T],
    num_accounts: usize,
    offset: usize,
) -> BTreeMap<SlotKey, Vec<T>> {
    let mut slots: BTreeMap<SlotKey, Vec<T>> = BTreeMap::new();
    for (position, target) in targets.iter().enumerate() {
        slots
            .entry(slot_for(position, num_accounts, offset))
            .or_default()
            .push(target.clone());
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_two_accounts() {
        let slots = distribute(&["A", "B", "C", "D", "E"], 2, 0);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[&SlotKey(1)], vec!["A", "C", "E"]);
        assert_eq!(slots[&SlotKey(0)], vec!["B", "D"]);
    }

    #[test]
    fn test_every_target_in_exactly_one_slot() {
        let targets: Vec<usize> = (0..37).collect();
        for n in 1..9 {
            let slots = distribute(&targets, n, 0);
            let mut seen: Vec<usize> = slots.values().flatten().copied().collect();
            seen.sort_unstable();
            assert_eq!(seen, targets, "num_accounts = {}", n);
            assert!(slots.keys().all(|k| k.index() < n));
        }
    }

    #[test]
    fn test_offsets_are_disjoint() {
        let targets: Vec<usize> = (0..25).collect();
        let primary: BTreeSet<SlotKey> = distribute(&targets, 10, 0).into_keys().collect();
        let secondary: BTreeSet<SlotKey> = distribute(&targets, 10, SECONDARY_OFFSET)
            .into_keys()
            .collect();
        assert!(primary.is_disjoint(&secondary));
        assert_eq!(secondary.iter().next(), Some(&SlotKey(10)));
    }

    #[test]
    fn test_single_account_and_empty_list() {
        let slots = distribute(&["A", "B"], 1, 0);
        assert_eq!(slots[&SlotKey(0)], vec!["A", "B"]);
        assert!(distribute::<&str>(&[], 4, 0).is_empty());
        assert_eq!(distribute(&["A"], 0, 0)[&SlotKey(0)], vec!["A"]);
    }

    #[test]
    fn test_slot_key_display() {
        assert_eq!(SlotKey(3).to_string(), "list_account_3");
    }
}
