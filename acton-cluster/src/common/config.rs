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

use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::actor::{RestartLimiterConfig, RestartPolicy};

/// Configuration for the Acton Cluster supervision engine
///
/// Loaded from `cluster.toml` in the XDG `acton` configuration directory.
/// Every section is optional; anything left out keeps its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Attempt bounds and worker counts
    pub limits: LimitsConfig,
    /// Creation retry backoff curve
    pub backoff: BackoffConfig,
    /// Key-value store layout
    pub store: StoreConfig,
    /// Behavioral switches
    pub behavior: BehaviorConfig,
    /// Restart limits applied when a supervisor panics
    pub supervisor_restart: RestartLimiterConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long the leader waits for `ChildCreated`; also the creation lock TTL
    pub create_child_ms: u64,
    /// How long a delivery worker waits for a forward to be acknowledged
    pub send_ms: u64,
    /// Pause before re-trying a held lock or a failed delivery
    pub next_attempt_pause_ms: u64,
    /// How long a stopping supervisor waits for its tasks
    pub supervisor_shutdown_ms: u64,
}

/// Attempt bounds and worker counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Number of parallel delivery workers per supervisor
    pub senders_count: usize,
    /// Creation attempts per identity before buffered messages are failed
    pub max_creation_attempts: u32,
    /// Times a held creation lock is re-tried before giving up
    pub max_lock_waits: u32,
    /// Delivery attempts per forwarded message
    pub max_delivery_attempts: u32,
    /// Supervisor-to-supervisor forwards a single message may take
    pub max_forward_hops: u32,
}

/// Backoff curve between creation attempts
///
/// The first pause is `timeouts.next_attempt_pause_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Growth factor applied after every failed attempt
    pub multiplier: f64,
    /// Upper bound for a single pause
    pub max_pause_ms: u64,
}

/// Key-value store layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix applied to every key written by a supervisor
    pub key_prefix: String,
}

/// What the leader does with identities orphaned by a departed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationPolicy {
    /// Recreate orphaned objects as soon as their node is removed.
    #[default]
    Eager,
    /// Recreate orphaned objects when the next message for them arrives.
    Lazy,
}

/// Behavioral configuration switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Migration of orphaned objects
    pub migration: MigrationPolicy,
    /// Restart policy for object actors whose handler panics
    pub object_restart_policy: RestartPolicy,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            create_child_ms: 5_000,
            send_ms: 1_000,
            next_attempt_pause_ms: 3_000,
            supervisor_shutdown_ms: 10_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            senders_count: 20,
            max_creation_attempts: 5,
            max_lock_waits: 20,
            max_delivery_attempts: 5,
            max_forward_hops: 8,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            max_pause_ms: 30_000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "acton".to_string(),
        }
    }
}

impl TimeoutConfig {
    /// `create_child_ms` as a [`Duration`]
    pub const fn create_child(&self) -> Duration {
        Duration::from_millis(self.create_child_ms)
    }

    /// `send_ms` as a [`Duration`]
    pub const fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    /// `next_attempt_pause_ms` as a [`Duration`]
    pub const fn next_attempt_pause(&self) -> Duration {
        Duration::from_millis(self.next_attempt_pause_ms)
    }

    /// `supervisor_shutdown_ms` as a [`Duration`]
    pub const fn supervisor_shutdown(&self) -> Duration {
        Duration::from_millis(self.supervisor_shutdown_ms)
    }
}

impl ClusterConfig {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the text is not a valid configuration.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `acton/cluster.toml` under `$XDG_CONFIG_HOME` and then the
    /// system configuration directories. If no file is found, or the file
    /// cannot be read or parsed, the default configuration is returned and
    /// the cause is logged.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("acton") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("cluster.toml") else {
            info!("No cluster configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading cluster configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(config_str) => match Self::from_toml(&config_str) {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: ClusterConfig = ClusterConfig::load();
}
