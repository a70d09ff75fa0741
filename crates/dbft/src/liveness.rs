//! Per-validator liveness tracking.

use dbft_types::PublicKey;
use std::collections::HashMap;

/// Height of the most recent message seen from each validator. An absent
/// entry means the validator has never been heard from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessTracker {
    last_seen: HashMap<PublicKey, u32>,
}

impl LivenessTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message from `validator` at `block_index`. Heights only
    /// move forward.
    pub fn note(&mut self, validator: PublicKey, block_index: u32) {
        let entry = self.last_seen.entry(validator).or_insert(block_index);
        *entry = (*entry).max(block_index);
    }

    /// The recorded height for `validator`.
    pub fn get(&self, validator: &PublicKey) -> Option<u32> {
        self.last_seen.get(validator).copied()
    }

    /// Rebuild for a view-0 reset. With an unchanged validator set the map
    /// is retained as-is; on a set change (or first use) entries for
    /// still-present validators carry forward and new validators start at
    /// the current height.
    pub fn rebuild(&mut self, validators: &[PublicKey], current_height: u32, changed: bool) {
        if !changed && !self.last_seen.is_empty() {
            return;
        }
        let mut next = HashMap::with_capacity(validators.len());
        for validator in validators {
            let height = self.last_seen.get(validator).copied().unwrap_or(current_height);
            next.insert(*validator, height);
        }
        self.last_seen = next;
    }

    /// Number of validators considered failed for the round at `height`:
    /// never heard from, or last seen below `height − 1`.
    pub fn count_failed(&self, validators: &[PublicKey], height: u32) -> usize {
        validators
            .iter()
            .filter(|validator| match self.last_seen.get(validator) {
                None => true,
                Some(&seen) => seen + 1 < height,
            })
            .count()
    }
}
