// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine configuration presets.

use crate::lane::LaneTimeouts;
use crate::scheduler::PriorityTimeouts;
use crate::time::Duration;

/// Configuration for a [`Reconciler`](crate::reconciler::Reconciler).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of one cooperative slice. Rendering yields to the host once a
    /// slice has run this long.
    pub frame_budget: Duration,
    /// Starvation timeouts per lane class.
    pub lane_timeouts: LaneTimeouts,
    /// Expiration timeouts per task priority.
    pub priority_timeouts: PriorityTimeouts,
}

impl EngineConfig {
    /// Short slices for hosts that must stay responsive to input.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            frame_budget: Duration::from_millis(5),
            lane_timeouts: LaneTimeouts::standard(),
            priority_timeouts: PriorityTimeouts::standard(),
        }
    }

    /// Long slices for hosts that care about throughput more than latency.
    #[must_use]
    pub const fn batch() -> Self {
        Self {
            frame_budget: Duration::from_millis(50),
            lane_timeouts: LaneTimeouts::standard(),
            priority_timeouts: PriorityTimeouts::standard(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_budget() {
        let interactive = EngineConfig::interactive();
        let batch = EngineConfig::batch();
        assert_eq!(interactive.frame_budget, Duration(5_000));
        assert_eq!(batch.frame_budget, Duration(50_000));
        assert_eq!(interactive.lane_timeouts, batch.lane_timeouts);
        assert_eq!(EngineConfig::default(), interactive);
    }
}
