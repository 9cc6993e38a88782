// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Application-wide configuration constants
pub struct AppConfig;

impl AppConfig {
    // Command execution
    pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
    pub const COMMAND_POLL_INTERVAL_MS: u64 = 10;

    // Parallel device probes
    pub const MAX_PARALLEL_PROBES: usize = 16;

    // Logging
    pub const DEFAULT_LOG_FILTER: &'static str = "warn";
    pub const VERBOSE_LOG_FILTER: &'static str = "textfile_collectors=debug";

    // Sentinel reported for probes skipped because the device is asleep
    pub const STANDBY_SENTINEL: f64 = -1.0;
}

/// Environment-specific configuration
pub struct EnvConfig;

impl EnvConfig {
    /// Number of concurrent device probes: the requested job count, or the CPU
    /// count when unset, clamped to `1..=MAX_PARALLEL_PROBES` and never more
    /// than the number of devices.
    pub fn probe_concurrency(requested: Option<usize>, devices: usize) -> usize {
        let wanted = requested.unwrap_or_else(num_cpus::get);
        wanted
            .clamp(1, AppConfig::MAX_PARALLEL_PROBES)
            .min(devices.max(1))
    }
}
