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

#![allow(async_fn_in_trait)]

use std::sync::Arc;

use crate::error::Result;
use crate::metrics::MetricAggregator;
use crate::runner::CommandSpec;
use crate::traits::runner::CommandRunner;

/// One textfile collector: a wrapped utility plus the rules that turn its
/// output into metric families.
pub trait Collector {
    /// Program name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Prefix prepended to every family name on output (e.g. `smartmon_`).
    fn namespace(&self) -> &'static str;

    /// Whether the wrapped utility needs an effective uid of 0.
    fn requires_root(&self) -> bool {
        false
    }

    /// Command used to check the wrapped utility is installed before any
    /// collection starts. `None` skips the check.
    fn tool_probe(&self) -> Option<CommandSpec> {
        None
    }

    /// Run the wrapped utility and aggregate everything it reported.
    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator>;
}
