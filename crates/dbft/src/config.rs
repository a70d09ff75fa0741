//! Consensus configuration.

use std::path::PathBuf;

/// Multiplier applied to the base block time when computing the primary's
/// proposal timeout. Exposed as a knob for outer schedulers; the fallback
/// primary may want 4/3 of the base in a future revision.
pub const PRIMARY_TIMER_MULTIPLIER: f64 = 1.0;

/// Options recognized by the consensus context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbftConfig {
    /// Network magic mixed into every signature.
    pub network: u32,
    /// Expected validator count; a mismatch at reset is logged, not fatal.
    pub validators_count: usize,
    /// Committee size, used for the committee-refresh epoch check.
    pub committee_members_count: usize,
    /// Directory for the durable round-state store.
    pub recovery_logs: PathBuf,
}

impl Default for DbftConfig {
    fn default() -> Self {
        Self {
            network: 0x5444_4246,
            validators_count: 7,
            committee_members_count: 21,
            recovery_logs: PathBuf::from("consensus-state"),
        }
    }
}

impl DbftConfig {
    /// Set the network magic.
    pub fn with_network(mut self, network: u32) -> Self {
        self.network = network;
        self
    }

    /// Set the expected validator count.
    pub fn with_validators_count(mut self, count: usize) -> Self {
        self.validators_count = count;
        self
    }

    /// Set the committee size.
    pub fn with_committee_members_count(mut self, count: usize) -> Self {
        self.committee_members_count = count;
        self
    }

    /// Set the durable store directory.
    pub fn with_recovery_logs(mut self, path: impl Into<PathBuf>) -> Self {
        self.recovery_logs = path.into();
        self
    }
}
