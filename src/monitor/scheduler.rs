// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Anti-detection scheduler: jittered pacing and session rotation policy.
//!
//! Fixed-interval polling is the easiest bot signature to spot, so the
//! scheduler samples each inter-check delay uniformly from a jitter range.
//! It also decides when the browser identity has served enough requests to
//! be rotated; resetting the counter after a successful rotation is the
//! state machine's job, not the scheduler's.

use rand::Rng;
use std::time::Duration;

use crate::config::AntiDetectionPolicy;

/// Computes inter-check delays and rotation decisions.
#[derive(Debug, Clone)]
pub struct Scheduler {
    policy: AntiDetectionPolicy,
}

impl Scheduler {
    pub fn new(policy: AntiDetectionPolicy) -> Self {
        Self { policy }
    }

    /// Next inter-check delay: uniform in `[jitter_min, jitter_max]` when
    /// random delays are enabled, else the fixed base interval.
    pub fn next_delay(&self) -> Duration {
        if !self.policy.random_delays_enabled {
            return Duration::from_secs(self.policy.base_interval_secs);
        }

        let lo = self
            .policy
            .jitter_min_secs
            .min(self.policy.jitter_max_secs)
            .saturating_mul(1000);
        let hi = self
            .policy
            .jitter_min_secs
            .max(self.policy.jitter_max_secs)
            .saturating_mul(1000);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Whether the session has served enough requests to be rotated.
    pub fn should_rotate(&self, request_count: u64) -> bool {
        self.policy.rotation_request_threshold > 0
            && request_count >= self.policy.rotation_request_threshold
    }
}
