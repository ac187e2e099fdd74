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

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::flow::FlowKind;
use crate::resolver::ChooserKind;

/// Configuration for the Switchboard kernel.
///
/// Loaded from `config.toml` in the XDG configuration directory for `switchboard`. Every
/// section and key is optional; anything left out keeps its default.
///
/// ```toml
/// [flow]
/// kind = "staged"
/// capacity = 100
/// workers = 4
///
/// [defaults]
/// fail_if_no_destination = true
/// chooser = "round_robin"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Dispatch strategy settings
    pub flow: FlowConfig,
    /// Channel and queue capacities
    pub limits: LimitsConfig,
    /// Shutdown timeouts
    pub timeouts: TimeoutConfig,
    /// Defaults applied to activations that leave a setting unspecified
    pub defaults: DefaultsConfig,
}

/// Dispatch strategy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Flow used for asynchronous sends.
    pub kind: FlowKind,
    /// Maximum number of exchanges waiting in one staged queue.
    pub capacity: usize,
    /// Worker tasks per staged queue.
    pub workers: usize,
}

/// Channel and queue capacities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Capacity of a pull-mode component's inbound queue.
    pub inbound_capacity: usize,
    /// Capacity of each in-memory transport binding.
    pub transport_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on the whole kernel shutdown in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Bound on a single component's deactivation in milliseconds.
    pub deactivate_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Whether an unresolvable exchange fails the send, unless the activation says otherwise.
    pub fail_if_no_destination: bool,
    /// Endpoint chooser used when an activation does not bring its own.
    pub chooser: ChooserKind,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            kind: FlowKind::Staged,
            capacity: 100,
            workers: 4,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 255,
            transport_capacity: 1024,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 10_000,
            deactivate_timeout_ms: 5_000,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            fail_if_no_destination: true,
            chooser: ChooserKind::RoundRobin,
        }
    }
}

impl KernelConfig {
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.shutdown_timeout_ms)
    }

    pub const fn deactivate_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.deactivate_timeout_ms)
    }

    /// Loads configuration from XDG-compliant locations.
    ///
    /// Looks for `switchboard/config.toml` under `$XDG_CONFIG_HOME` and then the XDG config
    /// search path. A missing file yields the defaults; a malformed one is logged and also
    /// yields the defaults.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("switchboard") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        match xdg_dirs.find_config_file("config.toml") {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                error!("Ignoring configuration file {}: {:#}", path.display(), e);
                Self::default()
            }),
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        }
    }

    /// Loads configuration from an explicit file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        info!("Loading configuration from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str::<Self>(&contents)?;
        Ok(config.normalized())
    }

    /// Zero capacities or worker counts would stall every queue; clamp them to one.
    fn normalized(mut self) -> Self {
        self.flow.capacity = self.flow.capacity.max(1);
        self.flow.workers = self.flow.workers.max(1);
        self.limits.inbound_capacity = self.limits.inbound_capacity.max(1);
        self.limits.transport_capacity = self.limits.transport_capacity.max(1);
        self
    }
}

lazy_static! {
    /// Configuration loaded once from XDG-compliant locations, used by
    /// [`Switchboard::launch_async`](crate::common::Switchboard::launch_async).
    pub static ref CONFIG: KernelConfig = KernelConfig::load();
}
