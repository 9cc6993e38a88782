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

//! NVMe controller inventory and SMART log pages via `nvme-cli`.

use std::fmt;
use std::sync::Arc;

use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::cli::CommonArgs;
use crate::collectors::probe_parallel;
use crate::common::config::EnvConfig;
use crate::error::{Error, Result};
use crate::metrics::{MetricAggregator, MetricKind};
use crate::parsing::flatten_json;
use crate::parsing::json::{json_f64, json_get, json_string};
use crate::runner::CommandSpec;
use crate::sanitize::{Rule, RuleTable, Sanitizer, Transform};
use crate::traits::{Collector, CommandRunner};

const NVME: &str = "nvme";

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^nvme version (\S+)").expect("valid nvme version regex"));

/// SMART / health log fields, keyed by their normalized JSON path.
static SMART_LOG: Lazy<Sanitizer> = Lazy::new(|| {
    let ratio = |key: &str, family: &str, help: &str| {
        Rule::exact(key, Transform::Numeric)
            .family(family)
            .help(help)
            .scale(0.01)
    };
    let counter = |key: &str, family: &str, help: &str| {
        Rule::exact(key, Transform::Numeric)
            .family(family)
            .help(help)
            .counter()
    };

    let rules = RuleTable::new()
        .rule(ratio("avail_spare", "available_spare_ratio", "Device available spare ratio"))
        .rule(ratio(
            "spare_thresh",
            "available_spare_threshold_ratio",
            "Device available spare threshold ratio",
        ))
        .rule(ratio("percent_used", "percentage_used_ratio", "Device percentage used ratio"))
        .rule(ratio("percentage_used", "percentage_used_ratio", "Device percentage used ratio"))
        // nvme-cli >= 2.11 reports the bitmap as an object with a `value` member
        .rule(
            Rule::exact("critical_warning_value", Transform::Numeric)
                .family("critical_warning")
                .help("Device critical warning bitmap field"),
        )
        .rule(
            Rule::exact("critical_warning", Transform::Numeric)
                .help("Device critical warning bitmap field"),
        )
        // Kelvin on the wire
        .rule(
            Rule::exact("temperature", Transform::Numeric)
                .family("temperature_celsius")
                .help("Device temperature in degrees Celsius")
                .offset(-273.0),
        )
        .rule(counter(
            "data_units_read",
            "data_units_read_total",
            "Number of 512-byte data units read by host, reported in thousands",
        ))
        .rule(counter(
            "data_units_written",
            "data_units_written_total",
            "Number of 512-byte data units written by host, reported in thousands",
        ))
        .rule(counter(
            "host_read_commands",
            "host_read_commands_total",
            "Device read commands from host",
        ))
        .rule(counter(
            "host_write_commands",
            "host_write_commands_total",
            "Device write commands from host",
        ))
        .rule(counter(
            "controller_busy_time",
            "controller_busy_time_seconds",
            "Device controller busy time in seconds",
        ))
        .rule(counter("power_cycles", "power_cycles_total", "Device number of power cycles"))
        .rule(counter("power_on_hours", "power_on_hours_total", "Device power-on hours"))
        .rule(counter(
            "unsafe_shutdowns",
            "unsafe_shutdowns_total",
            "Device number of unsafe shutdowns",
        ))
        .rule(counter("media_errors", "media_errors_total", "Device media errors total"))
        .rule(counter(
            "num_err_log_entries",
            "num_err_log_entries_total",
            "Device error log entry count",
        ));

    Sanitizer::new(rules)
});

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose NVMe device metrics in Prometheus text format", long_about = None)]
pub struct NvmeArgs {
    /// Number of devices probed in parallel (default: CPU count, at most 16).
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NvmeNamespace {
    /// Block device name without `/dev/`, e.g. `nvme0n1`.
    pub name: String,
    pub sector_size: f64,
    pub physical_size: f64,
    pub used_bytes: f64,
}

impl fmt::Display for NvmeNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NvmeController {
    pub controller: String,
    pub model: String,
    pub firmware: String,
    pub serial: String,
    pub transport: String,
    pub namespaces: Vec<NvmeNamespace>,
}

fn nvme_command(args: &[&str]) -> CommandSpec {
    // no locale specific number or date formatting
    CommandSpec::new(NVME)
        .args(args.iter().copied())
        .env("LC_ALL", "C")
        .check_status()
}

fn nvme_json_command(args: &[&str]) -> CommandSpec {
    // nvme-cli 2.11 always emits the verbose schema; ask for it on older versions too
    nvme_command(args).args(["--output-format", "json", "--verbose"])
}

fn array<'a>(v: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    json_get(v, key)?
        .as_array()
        .ok_or_else(|| Error::Parse(format!("Expected array at key '{key}'")))
}

/// `nvme version 2.4 (git 2.4+)` → `2.4`
pub fn parse_version(raw: &str) -> String {
    VERSION_RE
        .captures(raw)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Controllers and their namespaces from `nvme list --output-format json --verbose`.
pub fn parse_list(raw: &str) -> Result<Vec<NvmeController>> {
    let doc: Value = serde_json::from_str(raw)?;
    let mut controllers = Vec::new();
    for device in array(&doc, "Devices")? {
        for subsystem in array(device, "Subsystems")? {
            for ctrl in array(subsystem, "Controllers")? {
                let namespaces = array(ctrl, "Namespaces")?
                    .iter()
                    .map(|ns| {
                        Ok(NvmeNamespace {
                            name: json_string(ns, "NameSpace")?,
                            sector_size: json_f64(ns, "SectorSize")?,
                            physical_size: json_f64(ns, "PhysicalSize")?,
                            used_bytes: json_f64(ns, "UsedBytes")?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                controllers.push(NvmeController {
                    controller: json_string(ctrl, "Controller")?,
                    model: json_string(ctrl, "ModelNumber")?,
                    firmware: json_string(ctrl, "Firmware")?,
                    serial: json_string(ctrl, "SerialNumber")?.trim().to_string(),
                    transport: json_string(ctrl, "Transport")?,
                    namespaces,
                });
            }
        }
    }
    Ok(controllers)
}

fn probe_namespace(runner: &dyn CommandRunner, ns: &NvmeNamespace) -> Result<MetricAggregator> {
    let device = format!("/dev/{}", ns.name);
    let out = runner.run(&nvme_json_command(&["smart-log", device.as_str()]))?;
    let log: Value = serde_json::from_str(&out.stdout)?;

    let mut agg = MetricAggregator::new();
    let produced = SMART_LOG.sanitize_into(
        flatten_json(&log),
        &labels! { "device" => &ns.name },
        &mut agg,
    );
    if produced == 0 {
        return Err(Error::Parse(format!("no SMART log fields for {device}")));
    }
    Ok(agg)
}

#[derive(Debug, Clone, Default)]
pub struct NvmeCollector {
    jobs: Option<usize>,
}

impl NvmeCollector {
    pub fn new(jobs: Option<usize>) -> Self {
        Self { jobs }
    }

    pub fn from_args(args: &NvmeArgs) -> Self {
        Self::new(args.jobs)
    }
}

impl Collector for NvmeCollector {
    fn name(&self) -> &'static str {
        "nvme-metrics"
    }

    fn namespace(&self) -> &'static str {
        "nvme_"
    }

    fn requires_root(&self) -> bool {
        true
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(NVME).arg("version"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let mut agg = MetricAggregator::new();

        let version = runner.run(&nvme_command(&["version"]))?;
        agg.describe("nvmecli_info", "nvme-cli tool information", MetricKind::Gauge);
        agg.record(
            "nvmecli_info",
            labels! { "version" => parse_version(&version.stdout) },
            1.0,
        )?;

        let list = runner.run(&nvme_json_command(&["list"]))?;
        let controllers = parse_list(&list.stdout)?;

        agg.describe("controller_info", "Controller information", MetricKind::Gauge);
        agg.describe("sector_size_bytes", "Device sector size in bytes", MetricKind::Gauge);
        agg.describe("physical_size_bytes", "Device size in bytes", MetricKind::Gauge);
        agg.describe("used_bytes", "Device used size in bytes", MetricKind::Gauge);

        let mut namespaces = Vec::new();
        for ctrl in controllers {
            let info = labels! {
                "controller" => &ctrl.controller,
                "model" => &ctrl.model,
                "firmware" => &ctrl.firmware,
                "serial" => &ctrl.serial,
                "transport" => &ctrl.transport,
            };
            agg.record("controller_info", info, 1.0)?;

            for ns in ctrl.namespaces {
                let device = labels! { "device" => &ns.name };
                agg.record("sector_size_bytes", device.clone(), ns.sector_size)?;
                agg.record("physical_size_bytes", device.clone(), ns.physical_size)?;
                agg.record("used_bytes", device, ns.used_bytes)?;
                // Fetched per namespace, not per controller, to keep the
                // device label on every SMART series.
                namespaces.push(ns);
            }
        }

        let jobs = EnvConfig::probe_concurrency(self.jobs, namespaces.len());
        debug!(namespaces = namespaces.len(), jobs, "probing NVMe SMART logs");
        agg.merge(probe_parallel(namespaces, jobs, runner, probe_namespace).await);

        Ok(agg)
    }
}
