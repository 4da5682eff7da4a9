//! Consumer-side rate control for sample streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum rate at which a sample stream yields values.
///
/// This only shapes what the caller sees; the simulation keeps delivering at
/// the subscription's own cadence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRate {
    /// Every reported change
    #[default]
    Native,

    /// At most this many values per second, latest value wins
    Max(u32),
}

impl UpdateRate {
    /// Interval between yielded values, if throttling applies.
    ///
    /// `Max(0)` is treated as `Native`.
    pub fn throttle_interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
