/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Bounding restarts with a sliding window and exponential backoff.
//!
//! A supervisor that keeps panicking is restarted at most `max_restarts`
//! times per `window_secs`, sleeping an exponentially growing pause before
//! each restart. The same backoff curve spaces creation attempts.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for restart limiting and exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartLimiterConfig {
    /// When disabled, restarts are unlimited and immediate.
    pub enabled: bool,
    /// Restarts allowed within the window.
    pub max_restarts: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Pause before the first restart.
    pub initial_backoff_ms: u64,
    /// Upper bound for any pause.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive pauses.
    pub backoff_multiplier: f64,
}

impl Default for RestartLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: 5,
            window_secs: 60,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RestartLimiterConfig {
    /// A configuration that never refuses and never waits.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_restarts: 0,
            window_secs: 0,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 0.0,
        }
    }
}

/// `initial_ms * multiplier^step`, capped at `max_ms`.
pub(crate) fn exponential_backoff(initial_ms: u64, multiplier: f64, max_ms: u64, step: u32) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let backoff_ms = initial_ms as f64 * multiplier.powi(i32::try_from(step).unwrap_or(i32::MAX));
    #[allow(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss
    )]
    let capped_ms = backoff_ms.min(max_ms as f64).max(0.0) as u64;
    Duration::from_millis(capped_ms)
}

/// Refusal to restart: too many restarts inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("restart limit exceeded: {attempts} attempts (max {max_restarts}) in {window_secs} seconds")]
pub struct RestartLimitExceeded {
    /// Restarts counted in the window.
    pub attempts: usize,
    /// Allowed restarts.
    pub max_restarts: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// Tracks restarts inside a sliding window.
#[derive(Debug)]
pub struct RestartLimiter {
    config: RestartLimiterConfig,
    restart_timestamps: Vec<Instant>,
    consecutive_restarts: u32,
}

impl RestartLimiter {
    /// Creates a limiter.
    #[must_use]
    pub const fn new(config: RestartLimiterConfig) -> Self {
        Self {
            config,
            restart_timestamps: Vec::new(),
            consecutive_restarts: 0,
        }
    }

    /// Whether one more restart fits in the window.
    ///
    /// # Errors
    ///
    /// [`RestartLimitExceeded`] once the window is full.
    pub fn can_restart(&mut self) -> Result<(), RestartLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        self.restart_timestamps
            .retain(|&ts| now.duration_since(ts) < window);

        if self.restart_timestamps.len() >= self.config.max_restarts as usize {
            Err(RestartLimitExceeded {
                attempts: self.restart_timestamps.len(),
                max_restarts: self.config.max_restarts,
                window_secs: self.config.window_secs,
            })
        } else {
            Ok(())
        }
    }

    /// Records a restart and returns how long to wait before performing it.
    pub fn record_restart(&mut self) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }
        self.restart_timestamps.push(Instant::now());
        let backoff = exponential_backoff(
            self.config.initial_backoff_ms,
            self.config.backoff_multiplier,
            self.config.max_backoff_ms,
            self.consecutive_restarts,
        );
        self.consecutive_restarts += 1;
        backoff
    }

    /// Restarts counted in the current window.
    #[must_use]
    pub fn restarts_in_window(&self) -> usize {
        self.restart_timestamps.len()
    }
}

impl Default for RestartLimiter {
    fn default() -> Self {
        Self::new(RestartLimiterConfig::default())
    }
}
