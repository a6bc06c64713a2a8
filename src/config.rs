//! Engine configuration.

/// Levels per side summed for the imbalance metric.
pub const DEFAULT_IMBALANCE_LEVELS: usize = 5;

/// Levels per side copied into a snapshot.
pub const DEFAULT_SNAPSHOT_DEPTH: usize = 10;

/// Orders pre-allocated when the engine starts.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Tunables for an [`Engine`](crate::Engine) and its derived metrics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookConfig {
    /// Levels per side used by `imbalance()` and snapshots
    pub imbalance_levels: usize,
    /// Levels per side in a default snapshot
    pub snapshot_depth: usize,
    /// Resting orders to reserve room for up front
    pub initial_capacity: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            imbalance_levels: DEFAULT_IMBALANCE_LEVELS,
            snapshot_depth: DEFAULT_SNAPSHOT_DEPTH,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}
