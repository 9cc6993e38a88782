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

//! S.M.A.R.T. health and ATA attributes via `smartctl`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::cli::CommonArgs;
use crate::collectors::probe_parallel;
use crate::common::config::{AppConfig, EnvConfig};
use crate::error::{Error, Result};
use crate::metrics::{Labels, MetricAggregator, MetricKind};
use crate::parsing::common::split_command_line;
use crate::parsing::{LineParser, Separator};
use crate::runner::CommandSpec;
use crate::sanitize::SentinelTable;
use crate::traits::{Collector, CommandRunner};

const SMARTCTL: &str = "smartctl";

static DEVICE_INFO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<k>[^:]+?)(?:(?:\sis|):)\s*(?P<v>.*)$").expect("valid device info regex")
});

static ATA_ERROR_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Error (\d+) \[\d+\] occurred").expect("valid error count regex")
});

static SELF_TEST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^SMART.*(PASSED|OK)$").expect("valid self test regex"));

/// Sleeping disks report this instead of a health verdict.
static POWER_STATE_SENTINELS: Lazy<SentinelTable> = Lazy::new(|| {
    SentinelTable::new()
        .with("standby", AppConfig::STANDBY_SENTINEL)
        .with("sleep", AppConfig::STANDBY_SENTINEL)
});

/// `device_info` labels after `device` and `disk`, in output order.
const INFO_LABELS: [&str; 8] = [
    "vendor",
    "product",
    "revision",
    "lun_id",
    "model_family",
    "device_model",
    "serial_number",
    "firmware_version",
];

const ATTRIBUTE_WHITELIST: &[&str] = &[
    "airflow_temperature_cel",
    "command_timeout",
    "current_pending_sector",
    "end_to_end_error",
    "erase_fail_count_total",
    "g_sense_error_rate",
    "hardware_ecc_recovered",
    "host_reads_mib",
    "host_reads_32mib",
    "host_writes_mib",
    "host_writes_32mib",
    "load_cycle_count",
    "media_wearout_indicator",
    "wear_leveling_count",
    "nand_writes_1gib",
    "offline_uncorrectable",
    "power_cycle_count",
    "power_on_hours",
    "program_fail_count",
    "raw_read_error_rate",
    "reallocated_event_count",
    "reallocated_sector_ct",
    "reported_uncorrect",
    "sata_downshift_count",
    "seek_error_rate",
    "spin_retry_count",
    "spin_up_time",
    "start_stop_count",
    "temperature_case",
    "temperature_celsius",
    "temperature_internal",
    "total_lbas_read",
    "total_lbas_written",
    "udma_crc_error_count",
    "unsafe_shutdown_count",
    "workld_host_reads_perc",
    "workld_media_wear_indic",
    "workload_minutes",
];

const FAMILIES: &[(&str, &str)] = &[
    ("smartctl_version", "SMART metric smartctl_version"),
    ("device_active", "SMART metric device_active"),
    ("device_info", "SMART metric device_info"),
    ("device_smart_available", "SMART metric device_smart_available"),
    ("device_smart_enabled", "SMART metric device_smart_enabled"),
    ("device_smart_healthy", "SMART metric device_smart_healthy"),
    ("attr_value", "SMART metric attr_value"),
    ("attr_worst", "SMART metric attr_worst"),
    ("attr_threshold", "SMART metric attr_threshold"),
    ("attr_raw_value", "SMART metric attr_raw_value"),
    ("device_errors", "SMART metric device_errors"),
];

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose S.M.A.R.T. disk metrics in Prometheus text format", long_about = None)]
pub struct SmartmonArgs {
    /// Wake up disks to collect live stats.
    #[arg(short = 's', long)]
    pub wakeup_disks: bool,
    /// Use /dev/disk/by-id/X instead of /dev/sdX to index devices.
    #[arg(long)]
    pub by_id: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

/// A device as listed by `smartctl --scan-open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub path: String,
    /// smartctl device type, e.g. `sat` or `megaraid,0`.
    pub kind: String,
}

impl Device {
    pub fn base_labels(&self) -> Labels {
        let disk = match self.kind.split_once('+') {
            Some((_, disk)) if !disk.is_empty() => disk,
            _ => "0",
        };
        labels! { "device" => &self.path, "disk" => disk }
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(SMARTCTL)
            .args(args.iter().copied())
            .args(["--device", self.kind.as_str(), self.path.as_str()])
    }

    fn is_ata(&self) -> bool {
        self.kind.starts_with("sat")
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// One row of the ATA attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartAttribute {
    pub name: String,
    pub value: f64,
    pub worst: f64,
    pub threshold: f64,
    pub raw_value: f64,
}

/// `smartctl 7.2 2020-12-30 r5155 [...]` → `7.2`
pub fn parse_version(raw: &str) -> Option<String> {
    raw.lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

/// Parse `smartctl --scan-open` output, e.g.
/// `/dev/sda -d sat # /dev/sda [SAT], ATA device`.
pub fn parse_scan(raw: &str) -> Vec<Device> {
    raw.lines()
        .filter_map(|line| {
            let tokens = split_command_line(line.trim());
            let (path, rest) = tokens.split_first()?;
            let mut kind = None;
            let mut iter = rest.iter();
            while let Some(token) = iter.next() {
                match token.as_str() {
                    "-d" | "--device" => kind = iter.next().cloned(),
                    other => {
                        if let Some(value) = other.strip_prefix("--device=") {
                            kind = Some(value.to_string());
                        }
                    }
                }
            }
            Some(Device {
                path: path.clone(),
                kind: kind.unwrap_or_else(|| "auto".to_string()),
            })
        })
        .collect()
}

/// `Key: value` and `Key is: value` pairs of `smartctl --info`, after the
/// three line banner.
pub fn parse_info(raw: &str) -> Vec<(String, String)> {
    raw.trim()
        .lines()
        .skip(3)
        .filter_map(|line| {
            let caps = DEVICE_INFO_RE.captures(line)?;
            Some((caps["k"].to_string(), caps["v"].to_string()))
        })
        .collect()
}

fn info_label(key: &str) -> Option<&'static str> {
    match key {
        "Vendor" => Some("vendor"),
        "Product" => Some("product"),
        "Revision" => Some("revision"),
        "Logical Unit id" => Some("lun_id"),
        "Model Family" => Some("model_family"),
        "Device Model" => Some("device_model"),
        "Serial Number" | "Serial number" => Some("serial_number"),
        "Firmware Version" => Some("firmware_version"),
        _ => None,
    }
}

/// `(available, enabled)` from the `SMART support` lines of `--info`.
pub fn smart_capabilities(info: &[(String, String)]) -> (bool, bool) {
    let states: HashSet<&str> = info
        .iter()
        .filter(|(k, _)| k == "SMART support")
        .filter_map(|(_, v)| v.split_whitespace().next())
        .collect();
    (states.contains("Available"), states.contains("Enabled"))
}

/// Whitelisted rows of the `smartctl --attributes` table. When an attribute
/// name appears under several IDs only the first is kept.
pub fn parse_attributes(raw: &str) -> Vec<SmartAttribute> {
    let mut seen = HashSet::new();
    LineParser::new(Separator::Whitespace)
        .rows(raw)
        .filter(|row| row.len() >= 10 && row[0].bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|row| {
            let name = row[1].to_lowercase();
            if !ATTRIBUTE_WHITELIST.contains(&name.as_str()) {
                return None;
            }
            // "36 (Min/Max 24/40)" keeps only its leading integer
            let digits: String = row[9].chars().take_while(char::is_ascii_digit).collect();
            let raw_value = digits.parse::<f64>().ok()?;
            let threshold = match row[5].as_str() {
                "---" => 0.0,
                other => other.parse().ok()?,
            };
            let attr = SmartAttribute {
                value: row[3].parse().ok()?,
                worst: row[4].parse().ok()?,
                threshold,
                raw_value,
                name,
            };
            seen.insert(attr.name.clone()).then_some(attr)
        })
        .collect()
}

/// Number of the most recent entry in the extended error log, 0 if none.
pub fn parse_error_count(raw: &str) -> f64 {
    ATA_ERROR_COUNT_RE
        .captures(raw)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0.0)
}

fn as_gauge(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn probe_device(runner: &dyn CommandRunner, device: &Device, wakeup: bool) -> Result<MetricAggregator> {
    let mut agg = MetricAggregator::new();
    let base = device.base_labels();

    let power = runner.run(&device.command(&["--nocheck", "standby"]))?;
    let active = power.success();
    agg.record("device_active", base.clone(), as_gauge(active))?;

    // Skip further probes so the disk is not spun up.
    if !active && !wakeup {
        if let Some(sentinel) = POWER_STATE_SENTINELS.lookup(&power.stdout) {
            agg.record("device_smart_healthy", base, sentinel)?;
        }
        debug!(device = %device, "device asleep, skipping");
        return Ok(agg);
    }

    let info = parse_info(&runner.run(&device.command(&["--info"]))?.stdout);
    let mut values: HashMap<&str, &str> = HashMap::new();
    for (key, value) in &info {
        if let Some(label) = info_label(key) {
            values.entry(label).or_insert(value.as_str());
        }
    }
    let mut info_labels = base.clone();
    for label in INFO_LABELS {
        info_labels.insert(label, values.get(label).copied().unwrap_or(""));
    }
    agg.record("device_info", info_labels, 1.0)?;

    let (available, enabled) = smart_capabilities(&info);
    agg.record("device_smart_available", base.clone(), as_gauge(available))?;
    agg.record("device_smart_enabled", base.clone(), as_gauge(enabled))?;
    if !available {
        // further smartctl invocations would fail anyway
        return Ok(agg);
    }

    let health = runner.run(&device.command(&["--health"]))?;
    let healthy = SELF_TEST_RE.is_match(&health.stdout);
    agg.record("device_smart_healthy", base.clone(), as_gauge(healthy))?;

    if device.is_ata() {
        let table = runner.run(&device.command(&["--attributes"]))?;
        for attr in parse_attributes(&table.stdout) {
            let labels = base.clone().with("name", attr.name.as_str());
            agg.record("attr_value", labels.clone(), attr.value)?;
            agg.record("attr_worst", labels.clone(), attr.worst)?;
            agg.record("attr_threshold", labels.clone(), attr.threshold)?;
            agg.record("attr_raw_value", labels, attr.raw_value)?;
        }

        let log = runner.run(&device.command(&["-l", "xerror,1"]))?;
        agg.record("device_errors", base, parse_error_count(&log.stdout))?;
    }

    Ok(agg)
}

#[derive(Debug, Clone, Default)]
pub struct SmartmonCollector {
    wakeup_disks: bool,
    by_id: bool,
}

impl SmartmonCollector {
    pub fn new(wakeup_disks: bool, by_id: bool) -> Self {
        Self {
            wakeup_disks,
            by_id,
        }
    }

    pub fn from_args(args: &SmartmonArgs) -> Self {
        Self::new(args.wakeup_disks, args.by_id)
    }

    fn find_devices(&self, runner: &dyn CommandRunner) -> Result<Vec<Device>> {
        let mut spec = CommandSpec::new(SMARTCTL).arg("--scan-open");
        if self.by_id {
            spec = spec.args(["-d", "by-id"]);
        }
        let out = runner.run(&spec.check_status())?;
        Ok(parse_scan(&out.stdout))
    }
}

impl Collector for SmartmonCollector {
    fn name(&self) -> &'static str {
        "smartmon"
    }

    fn namespace(&self) -> &'static str {
        "smartmon_"
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(SMARTCTL).arg("-V"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let mut agg = MetricAggregator::new();
        for (name, help) in FAMILIES {
            agg.describe(name, help, MetricKind::Gauge);
        }

        let out = runner.run(&CommandSpec::new(SMARTCTL).arg("-V").check_status())?;
        let version = parse_version(&out.stdout)
            .ok_or_else(|| Error::Parse("unrecognized smartctl -V output".to_string()))?;
        agg.record("smartctl_version", labels! { "version" => version }, 1.0)?;

        let devices = self.find_devices(runner.as_ref())?;
        debug!(devices = devices.len(), "discovered SMART devices");

        let jobs = EnvConfig::probe_concurrency(None, devices.len());
        let wakeup = self.wakeup_disks;
        let probed = probe_parallel(devices, jobs, runner, move |runner, device| {
            probe_device(runner, device, wakeup)
        })
        .await;
        agg.merge(probed);

        Ok(agg)
    }
}
