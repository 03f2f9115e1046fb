//! Engine configuration options.

use serde::{Deserialize, Serialize};

/// Engine configuration. Per-market parameters live in `MarketConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_events: 100_000 }
    }
}
