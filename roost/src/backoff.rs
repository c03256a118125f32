// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::{thread_rng, Rng};
use std::time::Duration;

/// Reconnect delay policy.
///
/// The n-th consecutive failure yields `min(min_interval * 2^n, max_interval)`
/// with a multiplicative jitter, so that a fleet of clients losing the same
/// server does not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    min_interval: Duration,
    max_interval: Duration,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            min_interval,
            max_interval,
            attempts: 0,
        }
    }

    /// Get number of consecutive failures so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Compute delay before the next connect attempt and increase the
    /// failure count.
    pub fn next_delay(&mut self) -> Duration {
        let exp = 2_u32.saturating_pow(self.attempts.min(16));
        let base = self
            .min_interval
            .saturating_mul(exp)
            .min(self.max_interval);
        self.attempts = self.attempts.saturating_add(1);
        base.mul_f64(thread_rng().gen_range(0.5..=1.0))
    }

    /// Reset the failure count after a successful ConnectAck.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
