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

//! Command line surface and run loop shared by every collector binary.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::common::config::AppConfig;
use crate::error::{Outcome, Result};
use crate::metrics::{ExpositionFormatter, LabelPolicy, MetricAggregator};
use crate::runner::{ensure_root, ensure_tool, SystemRunner};
use crate::traits::{Collector, CommandRunner};

/// Flags every collector binary accepts.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Seconds to wait for each invocation of the wrapped utility.
    #[arg(long, value_name = "SECS", default_value_t = AppConfig::DEFAULT_COMMAND_TIMEOUT_SECS)]
    pub timeout: u64,
    /// Give every sample of a metric family the same label names, filling
    /// missing labels with an empty string.
    #[arg(long)]
    pub uniform_labels: bool,
    /// Log debug diagnostics to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Default for CommonArgs {
    fn default() -> Self {
        Self {
            timeout: AppConfig::DEFAULT_COMMAND_TIMEOUT_SECS,
            uniform_labels: false,
            verbose: false,
        }
    }
}

impl CommonArgs {
    pub fn label_policy(&self) -> LabelPolicy {
        if self.uniform_labels {
            LabelPolicy::Uniform
        } else {
            LabelPolicy::Lenient
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins unless `--verbose` is set.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(AppConfig::VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(AppConfig::DEFAULT_LOG_FILTER))
    };

    // stdout carries the exposition text only
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Privilege and tool checks that must pass before anything is collected.
pub fn preflight<C: Collector>(collector: &C, runner: &dyn CommandRunner) -> Result<()> {
    if collector.requires_root() {
        ensure_root(collector.name())?;
    }
    if let Some(probe) = collector.tool_probe() {
        ensure_tool(runner, &probe)?;
    }
    Ok(())
}

/// Format an aggregator's families under the collector's namespace.
pub fn render<C: Collector>(collector: &C, mut agg: MetricAggregator, policy: LabelPolicy) -> String {
    agg.set_policy(policy);
    ExpositionFormatter::new(collector.namespace()).render(&agg.finish())
}

/// Preflight, collect and render in one go.
pub async fn collect_exposition<C: Collector>(
    collector: &C,
    runner: Arc<dyn CommandRunner>,
    policy: LabelPolicy,
) -> Result<String> {
    preflight(collector, runner.as_ref())?;
    let agg = collector.collect(runner).await?;
    Ok(render(collector, agg, policy))
}

/// Entry point of every collector binary.
///
/// Exposition text goes to stdout only when the whole run succeeded;
/// diagnostics always go to stderr.
pub async fn run_collector<C: Collector>(collector: C, common: &CommonArgs) -> ExitCode {
    init_logging(common.verbose);

    let runner: Arc<dyn CommandRunner> =
        Arc::new(SystemRunner::new(Duration::from_secs(common.timeout)));

    let result = collect_exposition(&collector, runner, common.label_policy())
        .await
        .and_then(|text| {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(())
        });

    match result {
        Ok(()) => Outcome::Success.exit_code(),
        Err(e) => {
            error!(collector = collector.name(), "{e}");
            Outcome::from(&e).exit_code()
        }
    }
}
