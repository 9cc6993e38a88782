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

//! Pending zypper updates, patches and orphaned packages.

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, warn};

use crate::cli::CommonArgs;
use crate::error::{Error, Result};
use crate::metrics::{Labels, MetricAggregator, MetricKind};
use crate::parsing::{LineParser, Separator};
use crate::runner::CommandSpec;
use crate::traits::{Collector, CommandRunner};

const ZYPPER: &str = "zypper";
const NEEDS_RESTARTING: &str = "/usr/bin/needs-restarting";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose pending zypper updates and patches in Prometheus text format", long_about = None)]
pub struct ZypperArgs {
    /// Print all the package infos (default).
    #[arg(short = 'm', long = "more", conflicts_with = "less")]
    pub more: bool,
    /// Print less package infos.
    #[arg(short = 'l', long = "less")]
    pub less: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub repository: String,
    pub name: String,
    pub current_version: String,
    pub available_version: String,
    pub arch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPatch {
    pub repository: String,
    pub name: String,
    pub category: String,
    pub severity: String,
    pub interactive: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedPackage {
    pub name: String,
    pub version: String,
}

fn table_rows(raw: &str) -> Vec<Vec<String>> {
    // zypper prints a header row and a separator row before the data
    LineParser::new(Separator::Pipe).skip(2).rows(raw).collect()
}

/// `zypper --quiet lu`: `S | Repository | Name | Current Version | Available Version | Arch`
pub fn parse_updates(raw: &str) -> Vec<PendingUpdate> {
    table_rows(raw)
        .into_iter()
        .filter(|parts| parts.len() >= 6)
        .map(|parts| PendingUpdate {
            repository: parts[1].clone(),
            name: parts[2].clone(),
            current_version: parts[3].clone(),
            available_version: parts[4].clone(),
            arch: parts[5].clone(),
        })
        .collect()
}

/// `zypper --quiet lp`: `Repository | Name | Category | Severity | Interactive | Status | Summary`
pub fn parse_patches(raw: &str) -> Vec<PendingPatch> {
    table_rows(raw)
        .into_iter()
        .filter(|parts| parts.len() >= 6)
        .map(|parts| PendingPatch {
            repository: parts[0].clone(),
            name: parts[1].clone(),
            category: parts[2].clone(),
            severity: parts[3].clone(),
            interactive: parts[4].clone(),
            status: parts[5].clone(),
        })
        .collect()
}

/// `zypper --quiet pa --orphaned`: `S | Repository | Name | Version | Arch`
pub fn parse_orphaned(raw: &str) -> Vec<OrphanedPackage> {
    // zypper prints one leading status column and no outer border:
    //
    //   S  | Repository | Name         | Version       | Arch
    //   ---+------------+--------------+---------------+-------
    //   i  | @System    | legacy-tool  | 1.2.3-1.1     | x86_64
    //
    // so Name and Version are fields 2 and 3, not 3 and 4.
    table_rows(raw)
        .into_iter()
        .filter(|parts| parts.len() >= 5)
        .map(|parts| OrphanedPackage {
            name: parts[2].clone(),
            version: parts[3].clone(),
        })
        .collect()
}

/// `zypper 1.14.68` → `1.14.68`
pub fn parse_version(raw: &str) -> Option<String> {
    raw.split_whitespace().nth(1).map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct ZypperCollector {
    all_info: bool,
}

impl ZypperCollector {
    pub fn new(all_info: bool) -> Self {
        Self { all_info }
    }

    pub fn from_args(args: &ZypperArgs) -> Self {
        Self::new(!args.less)
    }

    fn zypper(&self, runner: &dyn CommandRunner, args: &[&str]) -> Result<String> {
        let spec = CommandSpec::new(ZYPPER).arg("--quiet").args(args.iter().copied());
        let out = runner.run(&spec)?;
        // 100-106 are informational (updates, security updates, reboot needed, ...)
        if out.status != 0 && out.status < 100 {
            return Err(Error::CommandFailed {
                command: spec.to_string(),
                code: Some(out.status),
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    fn record_updates(&self, agg: &mut MetricAggregator, updates: &[PendingUpdate]) -> Result<()> {
        let name = "zypper_update_pending";
        agg.describe(
            name,
            "zypper package update available from repository. (0 = not available, 1 = available)",
            MetricKind::Gauge,
        );
        for update in updates {
            let mut labels = labels! {
                "repository" => &update.repository,
                "package-name" => &update.name,
            };
            if self.all_info {
                labels.insert("available-version", &update.available_version);
            }
            agg.record(name, labels, 1.0)?;
        }
        if self.all_info {
            agg.placeholder(name, &["repository", "package-name", "available-version"])
        } else {
            agg.placeholder(name, &["repository", "package-name"])
        }
    }

    fn record_patches(&self, agg: &mut MetricAggregator, patches: &[PendingPatch]) -> Result<()> {
        let name = "zypper_patch_pending";
        agg.describe(
            name,
            "zypper patch available from repository. (0 = not available, 1 = available)",
            MetricKind::Gauge,
        );
        for patch in patches {
            let mut labels = labels! {
                "repository" => &patch.repository,
                "patch-name" => &patch.name,
            };
            if self.all_info {
                labels.insert("category", &patch.category);
                labels.insert("severity", &patch.severity);
            }
            labels.insert("interactive", &patch.interactive);
            labels.insert("status", &patch.status);
            agg.record(name, labels, 1.0)?;
        }
        if self.all_info {
            agg.placeholder(
                name,
                &["repository", "patch-name", "category", "severity", "interactive", "status"],
            )
        } else {
            agg.placeholder(name, &["repository", "patch-name", "interactive", "status"])
        }
    }

    fn record_orphans(&self, agg: &mut MetricAggregator, orphans: &[OrphanedPackage]) -> Result<()> {
        let name = "zypper_package_orphan";
        agg.describe(
            name,
            "zypper packages with no update source (orphaned)",
            MetricKind::Gauge,
        );
        for orphan in orphans {
            let labels = labels! {
                "package" => &orphan.name,
                "installed-version" => &orphan.version,
            };
            agg.record(name, labels, 1.0)?;
        }
        agg.placeholder(name, &["package", "installed-version"])
    }

    fn record_count<T>(
        agg: &mut MetricAggregator,
        name: &str,
        help: &str,
        items: &[T],
        filter: impl Fn(&T) -> bool,
    ) -> Result<()> {
        let count = items.iter().filter(|item| filter(item)).count();
        agg.describe(name, help, MetricKind::Gauge);
        agg.record(name, Labels::new(), count as f64)
    }

    fn record_reboot_required(&self, runner: &dyn CommandRunner, agg: &mut MetricAggregator) -> Result<()> {
        match runner.run(&CommandSpec::new(NEEDS_RESTARTING).arg("-r")) {
            Ok(out) => {
                agg.describe(
                    "node_reboot_required",
                    "Node require reboot to activate installed updates or patches. (0 = not needed, 1 = needed)",
                    MetricKind::Gauge,
                );
                let needed = if out.success() { 0.0 } else { 1.0 };
                agg.record("node_reboot_required", Labels::new(), needed)
            }
            Err(Error::ToolNotInstalled(_)) => {
                debug!("needs-restarting not available, skipping reboot check");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "reboot check failed");
                Ok(())
            }
        }
    }
}

impl Collector for ZypperCollector {
    fn name(&self) -> &'static str {
        "zypper-metrics"
    }

    // families carry their full names, node_reboot_required is not zypper_ prefixed
    fn namespace(&self) -> &'static str {
        ""
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(ZYPPER).arg("-V"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let runner = runner.as_ref();
        let updates = parse_updates(&self.zypper(runner, &["lu"])?);
        let patches = parse_patches(&self.zypper(runner, &["lp"])?);
        let orphans = parse_orphaned(&self.zypper(runner, &["pa", "--orphaned"])?);
        debug!(
            updates = updates.len(),
            patches = patches.len(),
            orphans = orphans.len(),
            "parsed zypper tables"
        );

        let mut agg = MetricAggregator::new();

        self.record_updates(&mut agg, &updates)?;
        Self::record_count(
            &mut agg,
            "zypper_updates_pending_total",
            "zypper packages updates available in total",
            &updates,
            |_| true,
        )?;

        self.record_patches(&mut agg, &patches)?;
        Self::record_count(
            &mut agg,
            "zypper_patches_pending_total",
            "zypper patches available total",
            &patches,
            |_| true,
        )?;
        Self::record_count(
            &mut agg,
            "zypper_patches_pending_security_total",
            "zypper patches available with category security total",
            &patches,
            |p| p.category == "security",
        )?;
        Self::record_count(
            &mut agg,
            "zypper_patches_pending_security_important_total",
            "zypper patches available with category security severity important total",
            &patches,
            |p| p.category == "security" && p.severity == "important",
        )?;
        Self::record_count(
            &mut agg,
            "zypper_patches_pending_reboot_total",
            "zypper patches available which require reboot total",
            &patches,
            |p| p.interactive == "reboot",
        )?;

        self.record_reboot_required(runner, &mut agg)?;

        let version = runner.run(&CommandSpec::new(ZYPPER).arg("-V"))?;
        if let Some(version) = parse_version(&version.stdout) {
            agg.describe("zypper_version", "zypper installed package version", MetricKind::Gauge);
            agg.record("zypper_version", labels! { "version" => version }, 1.0)?;
        }

        self.record_orphans(&mut agg, &orphans)?;

        Ok(agg)
    }
}
