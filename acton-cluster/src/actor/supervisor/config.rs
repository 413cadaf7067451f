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

use crate::actor::restart_limiter::exponential_backoff;
use crate::actor::{RestartLimiterConfig, RestartPolicy};
use crate::common::{ClusterConfig, MigrationPolicy, CONFIG};

/// Settings of one supervisor.
///
/// Start from [`SupervisorConfig::new`], which reads the process-wide
/// [`CONFIG`], and override individual values with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub(crate) role: String,
    pub(crate) name: String,
    pub(crate) key_prefix: String,
    pub(crate) create_child_timeout: Duration,
    pub(crate) send_timeout: Duration,
    pub(crate) next_attempt_pause: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) senders_count: usize,
    pub(crate) max_creation_attempts: u32,
    pub(crate) max_lock_waits: u32,
    pub(crate) max_delivery_attempts: u32,
    pub(crate) max_forward_hops: u32,
    pub(crate) backoff_multiplier: f64,
    pub(crate) max_backoff: Duration,
    pub(crate) migration: MigrationPolicy,
    pub(crate) object_restart_policy: RestartPolicy,
    pub(crate) restart_limiter: RestartLimiterConfig,
}

impl SupervisorConfig {
    /// Supervisor for `role`, named after it, with the global configuration.
    pub fn new(role: impl Into<String>) -> Self {
        Self::from_cluster_config(role, &CONFIG)
    }

    /// Supervisor for `role` with values taken from `config`.
    pub fn from_cluster_config(role: impl Into<String>, config: &ClusterConfig) -> Self {
        let role = role.into();
        Self {
            name: role.clone(),
            role,
            key_prefix: config.store.key_prefix.clone(),
            create_child_timeout: config.timeouts.create_child(),
            send_timeout: config.timeouts.send(),
            next_attempt_pause: config.timeouts.next_attempt_pause(),
            shutdown_timeout: config.timeouts.supervisor_shutdown(),
            senders_count: config.limits.senders_count,
            max_creation_attempts: config.limits.max_creation_attempts.max(1),
            max_lock_waits: config.limits.max_lock_waits,
            max_delivery_attempts: config.limits.max_delivery_attempts.max(1),
            max_forward_hops: config.limits.max_forward_hops.max(1),
            backoff_multiplier: config.backoff.multiplier,
            max_backoff: Duration::from_millis(config.backoff.max_pause_ms),
            migration: config.behavior.migration,
            object_restart_policy: config.behavior.object_restart_policy,
            restart_limiter: config.supervisor_restart.clone(),
        }
    }

    /// Cluster role served.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Supervisor name; scopes store keys and child paths.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the supervisor.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Prefix for every store key.
    #[must_use]
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// How long to wait for `ChildCreated`; also the creation lock TTL.
    #[must_use]
    pub const fn with_create_child_timeout(mut self, timeout: Duration) -> Self {
        self.create_child_timeout = timeout;
        self
    }

    /// How long a forward may stay unacknowledged.
    #[must_use]
    pub const fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Pause before re-trying a held lock or a failed forward.
    #[must_use]
    pub const fn with_next_attempt_pause(mut self, pause: Duration) -> Self {
        self.next_attempt_pause = pause;
        self
    }

    /// Number of delivery workers.
    #[must_use]
    pub const fn with_senders_count(mut self, senders_count: usize) -> Self {
        self.senders_count = senders_count;
        self
    }

    /// Creation attempts before buffered messages are failed.
    #[must_use]
    pub fn with_max_creation_attempts(mut self, attempts: u32) -> Self {
        self.max_creation_attempts = attempts.max(1);
        self
    }

    /// Times a held lock is re-tried.
    #[must_use]
    pub const fn with_max_lock_waits(mut self, waits: u32) -> Self {
        self.max_lock_waits = waits;
        self
    }

    /// Delivery attempts per forwarded message.
    #[must_use]
    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts.max(1);
        self
    }

    /// Migration of objects orphaned by a departed node.
    #[must_use]
    pub const fn with_migration(mut self, migration: MigrationPolicy) -> Self {
        self.migration = migration;
        self
    }

    /// Restart policy of object actors.
    #[must_use]
    pub const fn with_object_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.object_restart_policy = policy;
        self
    }

    /// Restart limits for the supervisor itself.
    #[must_use]
    pub fn with_restart_limiter(mut self, limiter: RestartLimiterConfig) -> Self {
        self.restart_limiter = limiter;
        self
    }

    /// Pause after the `failures`-th failed creation attempt (zero based).
    pub(crate) fn creation_backoff(&self, failures: u32) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        let initial_ms = self.next_attempt_pause.as_millis() as u64;
        #[allow(clippy::cast_possible_truncation)]
        let max_ms = self.max_backoff.as_millis() as u64;
        exponential_backoff(initial_ms, self.backoff_multiplier, max_ms.max(initial_ms), failures)
    }
}
