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

//! Pool and dataset state via `zpool` and `zfs`.
//!
//! Five independent reports are gathered concurrently: pool metadata, pool
//! capacity, dataset metadata, dataset space accounting and the vdev tree
//! from `zpool status`. A report that fails is logged and left out.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime, TimeZone};
use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cli::CommonArgs;
use crate::collectors::probe_parallel;
use crate::error::{Error, Result};
use crate::metrics::{Labels, MetricAggregator, MetricKind};
use crate::parsing::common::{parse_number, parse_strict_f64};
use crate::parsing::{LineParser, Separator};
use crate::runner::CommandSpec;
use crate::traits::{Collector, CommandRunner};

const ZPOOL: &str = "zpool";
const ZFS: &str = "zfs";

const ZPOOL_METADATA_LABELS: &[&str] = &[
    "health",
    "version",
    "readonly",
    "ashift",
    "autoreplace",
    "failmode",
];

/// `(property, unit suffix, help)`
const ZPOOL_INFO_METRICS: &[(&str, &str, &str)] = &[
    ("size", "bytes", "Total size of the storage pool"),
    ("free", "bytes", "The amount of free space available in the pool"),
    (
        "freeing",
        "bytes",
        "The amount of space waiting to be reclaimed from destroyed filesystems or snapshots",
    ),
    ("dedupratio", "", "The deduplication ratio"),
    ("fragmentation", "", "The amount of fragmentation in the pool"),
];

const DATASET_TYPES: &str = "filesystem,volume";

const DATASET_METADATA_LABELS: &[&str] = &[
    "type",
    "creation",
    "mounted",
    "checksum",
    "compression",
    "readonly",
    "version",
    "dedup",
    "volblocksize",
];

const DATASET_INFO_METRICS: &[(&str, &str, &str)] = &[
    (
        "used",
        "bytes",
        "The amount of space consumed by this dataset and all its descendents",
    ),
    (
        "available",
        "bytes",
        "The amount of space available to the dataset and all its children",
    ),
    (
        "referenced",
        "bytes",
        "The amount of data that is accessible by this dataset, which may or may not be shared with other datasets in the pool",
    ),
    (
        "compressratio",
        "",
        "For non-snapshots, the compression ratio achieved for the used space of this dataset, expressed as a multiplier",
    ),
    (
        "reservation",
        "bytes",
        "The minimum amount of space guaranteed to a dataset and its descendants",
    ),
    (
        "refreservation",
        "bytes",
        "The minimum amount of space guaranteed to a dataset, not including its descendents",
    ),
    ("volsize", "bytes", "For volumes, specifies the logical size of the volume"),
];

static SECTION_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\w+):\s*(.*)$").expect("valid zpool status key regex"));

static CONFIG_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([\t ]*)(\S+)(?:[\t ]+(\S+))?(?:[\t ]+(.*))?$").expect("valid vdev line regex")
});

static SCAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(scrub repaired|resilvered) (\S+) in (\S+) with \d+ errors on (.+)$")
        .expect("valid scan regex")
});

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose ZFS pool and dataset metrics in Prometheus text format", long_about = None)]
pub struct ZfsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// One vdev line of the `config:` block of `zpool status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdevConfig {
    pub name: String,
    /// Names from the pool (or `spares`) down to this vdev.
    pub path: Vec<String>,
    pub state: String,
    pub read: Option<u64>,
    pub write: Option<u64>,
    pub checksum: Option<u64>,
    pub comment: Option<String>,
}

impl VdevConfig {
    /// `pool://mirror-0/sda`
    pub fn path_label(&self) -> String {
        match self.path.split_first() {
            Some((root, rest)) => format!("{root}://{}", rest.join("/")),
            None => String::new(),
        }
    }
}

/// Outcome of the most recent scrub or resilver.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanInfo {
    /// Completion time as printed, in the host's local time zone.
    pub at: NaiveDateTime,
    pub duration_seconds: u64,
    pub corrected_bytes: f64,
}

impl ScanInfo {
    fn timestamp(&self) -> i64 {
        Local
            .from_local_datetime(&self.at)
            .earliest()
            .map_or_else(|| self.at.and_utc().timestamp(), |dt| dt.timestamp())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolStatus {
    pub name: String,
    pub state: String,
    pub configs: Vec<VdevConfig>,
    pub scrub: Option<ScanInfo>,
    pub resilvering: Option<ScanInfo>,
}

/// `-` marks a property that does not apply to the pool or dataset. Ratios
/// carry an `x` suffix and percentages a `%` unless `-p` strips them.
pub fn parse_property(value: &str) -> Result<Option<f64>> {
    if value == "-" {
        return Ok(None);
    }
    parse_strict_f64(value.trim_end_matches(['x', '%']))
        .map(Some)
        .ok_or_else(|| Error::Parse(format!("invalid zfs property value '{value}'")))
}

/// Rows of `-H` output, each checked to carry exactly `columns` fields.
pub fn parse_tabular(raw: &str, columns: usize) -> Result<Vec<Vec<String>>> {
    LineParser::new(Separator::Tab)
        .rows(raw)
        .map(|row| {
            if row.len() == columns {
                Ok(row)
            } else {
                Err(Error::Parse(format!(
                    "expected {columns} tab separated columns, got {}",
                    row.len()
                )))
            }
        })
        .collect()
}

/// `1048576`, `0B`, `25.8M` → bytes, with binary multiples.
pub fn parse_si_bytes(value: &str) -> Result<f64> {
    let invalid = || Error::Parse(format!("invalid size '{value}'"));
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<f64>().map_err(|_| invalid());
    }
    let unit = value.chars().last().ok_or_else(invalid)?;
    let exponent = "BKMGTPEZY"
        .find(unit.to_ascii_uppercase())
        .ok_or_else(invalid)?;
    let number = parse_strict_f64(&value[..value.len() - unit.len_utf8()]).ok_or_else(invalid)?;
    Ok((number * 1024f64.powi(exponent as i32)).round())
}

/// `06:58:02`, `1:00:00:00` or `1h2m3s` → seconds.
pub fn parse_duration(value: &str) -> Result<u64> {
    const UNITS: [(char, u64); 6] = [
        ('s', 1),
        ('m', 60),
        ('h', 3_600),
        ('d', 86_400),
        ('w', 604_800),
        ('y', 31_536_000),
    ];
    let invalid = || Error::Parse(format!("invalid duration '{value}'"));

    if value.contains(':') {
        let mut seconds = 0;
        for (position, part) in value.split(':').rev().enumerate() {
            let (_, factor) = UNITS.get(position).ok_or_else(invalid)?;
            seconds += part.parse::<u64>().map_err(|_| invalid())? * factor;
        }
        return Ok(seconds);
    }

    let mut seconds = 0;
    let mut number = 0u64;
    for c in value.chars() {
        if let Some(digit) = c.to_digit(10) {
            number = number * 10 + u64::from(digit);
        } else {
            let (_, factor) = UNITS.iter().find(|(unit, _)| *unit == c).ok_or_else(invalid)?;
            seconds += number * factor;
            number = 0;
        }
    }
    Ok(seconds)
}

fn parse_scan(value: &str) -> Result<Option<(bool, ScanInfo)>> {
    let Some(caps) = SCAN_RE.captures(value) else {
        return Ok(None);
    };
    let at = NaiveDateTime::parse_from_str(caps[4].trim(), "%a %b %e %H:%M:%S %Y")
        .map_err(|e| Error::Parse(format!("invalid scan time '{}': {e}", &caps[4])))?;
    let scan = ScanInfo {
        at,
        duration_seconds: parse_duration(&caps[3])?,
        corrected_bytes: parse_si_bytes(&caps[2])?,
    };
    Ok(Some((&caps[1] == "scrub repaired", scan)))
}

fn parse_config(lines: &[&str]) -> Vec<VdevConfig> {
    let mut configs = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut offset = None;

    // the first line is the NAME/STATE/READ/WRITE/CKSUM header
    let rows = lines
        .iter()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .filter_map(|line| CONFIG_LINE_RE.captures(line))
        .skip(1);

    for caps in rows {
        let indent = caps[1].len() / 2;
        let offset = *offset.get_or_insert(indent);
        let state = caps.get(3).map_or("", |m| m.as_str()).to_string();
        let rest: Vec<&str> = caps
            .get(4)
            .map_or("", |m| m.as_str())
            .split_whitespace()
            .collect();

        let counters: Option<Vec<u64>> = rest.iter().take(3).map(|t| parse_number(t)).collect();
        let (counters, comment) = match counters {
            Some(c) if c.len() == 3 => (Some(c), &rest[3..]),
            _ => (None, &rest[..]),
        };
        let comment = (!comment.is_empty()).then(|| comment.join(" "));

        // A replaced device is listed by guid; its old path names it.
        let name = match comment.as_deref().and_then(|c| c.strip_prefix("was ")) {
            Some(was) => was.rsplit('/').next().unwrap_or(was).to_string(),
            None => caps[2].to_string(),
        };

        stack.truncate(indent.saturating_sub(offset));
        stack.push(name.clone());
        if name == "spares" {
            continue;
        }

        let counter = |i: usize| counters.as_ref().map(|c| c[i]);
        configs.push(VdevConfig {
            name,
            path: stack.clone(),
            state,
            read: counter(0),
            write: counter(1),
            checksum: counter(2),
            comment,
        });
    }
    configs
}

/// Split `zpool status` output into one `key → lines` list per pool.
fn pool_sections(raw: &str) -> Vec<Vec<(String, Vec<&str>)>> {
    let mut pools = Vec::new();
    let mut current: Option<Vec<(String, Vec<&str>)>> = None;

    for line in raw.lines() {
        if let Some(caps) = SECTION_KEY_RE.captures(line) {
            let key = caps[1].to_string();
            let first = caps.get(2).map_or("", |m| m.as_str());
            if key == "pool" {
                pools.extend(current.take());
                current = Some(Vec::new());
            }
            if let Some(section) = current.as_mut() {
                section.push((key, vec![first]));
            }
        } else if let Some((_, lines)) = current.as_mut().and_then(|s| s.last_mut()) {
            lines.push(line);
        }
    }
    pools.extend(current);
    pools
}

/// Parse `zpool status -p`. Pools without a vdev tree are left out.
pub fn parse_status(raw: &str) -> Result<Vec<PoolStatus>> {
    let mut statuses = Vec::new();

    for section in pool_sections(raw) {
        let value = |key: &str| {
            section
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, lines)| lines.join("\n").trim().to_string())
                .unwrap_or_default()
        };

        let configs = section
            .iter()
            .find(|(k, _)| k == "config")
            .map(|(_, lines)| parse_config(lines))
            .unwrap_or_default();
        if configs.is_empty() {
            continue;
        }

        let mut status = PoolStatus {
            name: value("pool"),
            state: value("state"),
            configs,
            scrub: None,
            resilvering: None,
        };
        match parse_scan(&value("scan"))? {
            Some((true, scan)) => status.scrub = Some(scan),
            Some((false, scan)) => status.resilvering = Some(scan),
            None => {}
        }
        statuses.push(status);
    }
    Ok(statuses)
}

fn family(prefix: &str, property: &str, unit: &str) -> String {
    if unit.is_empty() {
        format!("{prefix}_{property}")
    } else {
        format!("{prefix}_{property}_{unit}")
    }
}

/// One independent `zpool`/`zfs` invocation and the families it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    PoolMetadata,
    PoolInfo,
    DatasetMetadata,
    DatasetMetrics,
    PoolStatus,
}

impl Report {
    pub const ALL: [Report; 5] = [
        Report::PoolMetadata,
        Report::PoolInfo,
        Report::DatasetMetadata,
        Report::DatasetMetrics,
        Report::PoolStatus,
    ];

    fn columns(properties: impl IntoIterator<Item = &'static str>) -> String {
        std::iter::once("name")
            .chain(properties)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn command(self) -> CommandSpec {
        let spec = match self {
            Report::PoolMetadata => CommandSpec::new(ZPOOL)
                .args(["list", "-H", "-o"])
                .arg(Self::columns(ZPOOL_METADATA_LABELS.iter().copied())),
            Report::PoolInfo => CommandSpec::new(ZPOOL)
                .args(["list", "-Hp", "-o"])
                .arg(Self::columns(ZPOOL_INFO_METRICS.iter().map(|(p, _, _)| *p))),
            Report::DatasetMetadata => CommandSpec::new(ZFS)
                .args(["list", "-Hp", "-t", DATASET_TYPES, "-o"])
                .arg(Self::columns(DATASET_METADATA_LABELS.iter().copied())),
            Report::DatasetMetrics => CommandSpec::new(ZFS)
                .args(["list", "-Hp", "-t", DATASET_TYPES, "-o"])
                .arg(Self::columns(DATASET_INFO_METRICS.iter().map(|(p, _, _)| *p))),
            Report::PoolStatus => CommandSpec::new(ZPOOL).args(["status", "-p"]),
        };
        spec.env("LC_ALL", "C").check_status()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

fn record_metadata(
    agg: &mut MetricAggregator,
    family: &str,
    name_label: &str,
    label_names: &[&str],
    raw: &str,
) -> Result<()> {
    for row in parse_tabular(raw, label_names.len() + 1)? {
        let mut labels = Labels::new().with(name_label, row[0].as_str());
        for (name, value) in label_names.iter().zip(&row[1..]) {
            labels.insert(*name, value.as_str());
        }
        agg.record(family, labels, 1.0)?;
    }
    Ok(())
}

fn record_properties(
    agg: &mut MetricAggregator,
    prefix: &str,
    name_label: &str,
    metrics: &[(&str, &str, &str)],
    raw: &str,
) -> Result<()> {
    for (property, unit, help) in metrics {
        agg.describe(&family(prefix, property, unit), help, MetricKind::Gauge);
    }
    for row in parse_tabular(raw, metrics.len() + 1)? {
        for ((property, unit, _), value) in metrics.iter().zip(&row[1..]) {
            if let Some(value) = parse_property(value)? {
                let labels = Labels::new().with(name_label, row[0].as_str());
                agg.record(&family(prefix, property, unit), labels, value)?;
            }
        }
    }
    Ok(())
}

fn record_scan(
    agg: &mut MetricAggregator,
    activity: &str,
    pool: &str,
    scan: &ScanInfo,
) -> Result<()> {
    let duration = format!("zpool_{activity}_duration_seconds");
    let corrected = format!("zpool_{activity}_corrected_bytes");
    let time = format!("zpool_{activity}_time_seconds");
    agg.describe(
        &duration,
        &format!("The duration of the latest zpool {activity} in seconds"),
        MetricKind::Gauge,
    )
    .describe(
        &corrected,
        &format!("The number of corrected bytes of the latest zpool {activity}"),
        MetricKind::Gauge,
    )
    .describe(
        &time,
        &format!("The timestamp of the latest zpool {activity}"),
        MetricKind::Gauge,
    );

    let labels = labels! { "zpool_name" => pool };
    agg.record(&duration, labels.clone(), scan.duration_seconds as f64)?;
    agg.record(&corrected, labels.clone(), scan.corrected_bytes)?;
    agg.record(&time, labels, scan.timestamp() as f64)
}

fn record_status(agg: &mut MetricAggregator, raw: &str) -> Result<()> {
    agg.describe("zpool_status", "The status of the zpool", MetricKind::Gauge)
        .describe(
            "zpool_vdev_info",
            "Information about the vdevs in a zpool",
            MetricKind::Gauge,
        );

    let text = |count: Option<u64>| count.map(|c| c.to_string()).unwrap_or_default();
    for status in parse_status(raw)? {
        agg.record(
            "zpool_status",
            labels! { "zpool_name" => &status.name, "state" => &status.state },
            1.0,
        )?;
        if let Some(scan) = &status.scrub {
            record_scan(agg, "scrub", &status.name, scan)?;
        }
        if let Some(scan) = &status.resilvering {
            record_scan(agg, "resilvering", &status.name, scan)?;
        }
        for vdev in &status.configs {
            let labels = labels! {
                "zpool_name" => &status.name,
                "vdev_name" => &vdev.name,
                "path" => vdev.path_label(),
                "state" => &vdev.state,
                "read" => text(vdev.read),
                "write" => text(vdev.write),
                "checksum" => text(vdev.checksum),
            };
            agg.record("zpool_vdev_info", labels, 1.0)?;
        }
    }
    Ok(())
}

fn run_report(runner: &dyn CommandRunner, report: &Report) -> Result<MetricAggregator> {
    let out = runner.run(&report.command())?;
    let mut agg = MetricAggregator::new();
    match report {
        Report::PoolMetadata => {
            agg.describe(
                "zpool",
                "Constant metric with metadata about the zpool",
                MetricKind::Gauge,
            );
            record_metadata(&mut agg, "zpool", "zpool_name", ZPOOL_METADATA_LABELS, &out.stdout)?;
        }
        Report::PoolInfo => {
            record_properties(&mut agg, "zpool", "pool_name", ZPOOL_INFO_METRICS, &out.stdout)?;
        }
        Report::DatasetMetadata => {
            agg.describe(
                "dataset",
                "Constant metric with metadata about the zfs dataset",
                MetricKind::Gauge,
            );
            record_metadata(
                &mut agg,
                "dataset",
                "dataset_name",
                DATASET_METADATA_LABELS,
                &out.stdout,
            )?;
        }
        Report::DatasetMetrics => {
            record_properties(
                &mut agg,
                "dataset",
                "dataset_name",
                DATASET_INFO_METRICS,
                &out.stdout,
            )?;
        }
        Report::PoolStatus => record_status(&mut agg, &out.stdout)?,
    }
    Ok(agg)
}

#[derive(Debug, Clone, Default)]
pub struct ZfsCollector;

impl ZfsCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for ZfsCollector {
    fn name(&self) -> &'static str {
        "zfs-metrics"
    }

    fn namespace(&self) -> &'static str {
        "zfs_"
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(ZPOOL).arg("version"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let reports = Report::ALL.to_vec();
        let jobs = reports.len();
        Ok(probe_parallel(reports, jobs, runner, run_report).await)
    }
}
