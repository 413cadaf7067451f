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

use std::fs;
use std::time::Duration;

use acton_cluster::prelude::*;
use tempfile::TempDir;

/// Both cases share one test so `XDG_CONFIG_HOME` is never changed concurrently.
#[test]
fn cluster_configuration_is_read_from_xdg_config_home() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config_dir = temp_dir.path().join("acton");
    fs::create_dir_all(&config_dir)?;

    let config_content = r#"
        [timeouts]
        create_child_ms = 2500

        [limits]
        senders_count = 4

        [behavior]
        migration = "lazy"
        object_restart_policy = "temporary"
    "#;
    fs::write(config_dir.join("cluster.toml"), config_content)?;
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let config = ClusterConfig::load();
    assert_eq!(config.timeouts.create_child(), Duration::from_millis(2500));
    assert_eq!(config.timeouts.send(), Duration::from_millis(1000));
    assert_eq!(config.limits.senders_count, 4);
    assert_eq!(config.limits.max_creation_attempts, 5);
    assert_eq!(config.behavior.migration, MigrationPolicy::Lazy);
    assert_eq!(config.behavior.object_restart_policy, RestartPolicy::Temporary);

    let supervisor = SupervisorConfig::from_cluster_config("orders", &config);
    assert_eq!(supervisor.role(), "orders");
    assert_eq!(supervisor.name(), "orders");

    fs::write(config_dir.join("cluster.toml"), "[limits\nsenders_count = ")?;
    let fallback = ClusterConfig::load();
    assert_eq!(fallback.limits.senders_count, 20);
    assert_eq!(fallback.behavior.migration, MigrationPolicy::Eager);

    temp_dir.close()?;
    Ok(())
}
