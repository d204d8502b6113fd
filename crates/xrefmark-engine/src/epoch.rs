use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag identifying one triggering event and all work derived from it
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Epoch {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Epoch)
    }
}

/// Monotonic request counter.
///
/// Every triggering event advances the counter once; work stamped with any
/// other value is stale and must be dropped without side effects.
#[derive(Debug, Default)]
pub struct EpochTracker {
    current: Epoch,
}

impl EpochTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Epoch {
        self.current
    }

    /// Start a new epoch and return it
    pub fn advance(&mut self) -> Epoch {
        self.current = Epoch(self.current.0 + 1);
        self.current
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current == epoch
    }
}
