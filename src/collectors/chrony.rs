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

//! NTP tracking and source statistics via `chronyc -c`.

use std::sync::Arc;

use clap::Parser;

use crate::cli::CommonArgs;
use crate::error::{Error, Result};
use crate::metrics::{Labels, MetricAggregator, MetricKind};
use crate::parsing::common::parse_strict_f64;
use crate::parsing::{LineParser, Separator};
use crate::runner::CommandSpec;
use crate::traits::{Collector, CommandRunner};

const CHRONYC: &str = "chronyc";

const TRACKING_FIELDS: usize = 14;
const SOURCES_FIELDS: usize = 10;
const SOURCESTATS_FIELDS: usize = 8;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose chrony NTP metrics in Prometheus text format", long_about = None)]
pub struct ChronyArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

fn source_mode(symbol: &str) -> Option<&'static str> {
    match symbol {
        "^" => Some("server"),
        "=" => Some("peer"),
        "#" => Some("reference clock"),
        _ => None,
    }
}

fn source_status(symbol: &str) -> Option<&'static str> {
    match symbol {
        "*" => Some("synchronized (system peer)"),
        "+" => Some("synchronized"),
        "?" => Some("unreachable"),
        "x" => Some("Falseticker"),
        "-" => Some("reference clock"),
        "~" => Some("too variable"),
        _ => None,
    }
}

fn number(field: &str, what: &str) -> Result<f64> {
    parse_strict_f64(field)
        .ok_or_else(|| Error::Parse(format!("invalid {what} value '{field}'")))
}

fn csv_rows(raw: &str, fields: usize, what: &str) -> Result<Vec<Vec<String>>> {
    LineParser::new(Separator::Comma)
        .rows(raw)
        .map(|row| {
            if row.len() == fields {
                Ok(row)
            } else {
                Err(Error::Parse(format!(
                    "unable to parse chronyc {what} CSV: expected {fields} fields, got {}",
                    row.len()
                )))
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tracking {
    pub ref_id: String,
    pub ref_host: String,
    pub stratum: f64,
    pub system_offset: f64,
    pub last_offset: f64,
    pub root_dispersion: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub mode: &'static str,
    pub status: &'static str,
    pub ref_host: String,
    pub stratum: String,
    /// log2 of the polling interval in seconds
    pub poll: f64,
    pub reach: f64,
    pub last_received: f64,
    pub original_offset: f64,
    pub measured_offset: f64,
    pub offset_margin: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub ref_host: String,
    pub sample_points: f64,
    pub residual_runs: f64,
    pub span: f64,
    pub frequency: f64,
    pub frequency_skew: f64,
    pub std_dev: f64,
}

/// `chronyc -c tracking`: a single line of 14 fields.
pub fn parse_tracking(raw: &str) -> Result<Tracking> {
    let rows = csv_rows(raw, TRACKING_FIELDS, "tracking")?;
    let row = match rows.as_slice() {
        [row] => row,
        _ => {
            return Err(Error::Parse(format!(
                "unable to parse chronyc tracking CSV: expected one line, got {}",
                rows.len()
            )))
        }
    };
    Ok(Tracking {
        ref_id: row[0].clone(),
        ref_host: row[1].clone(),
        stratum: number(&row[2], "stratum")?,
        system_offset: number(&row[4], "system time offset")?,
        last_offset: number(&row[5], "last offset")?,
        root_dispersion: number(&row[11], "root dispersion")?,
    })
}

/// `chronyc -c sources`: one line of 10 fields per source.
pub fn parse_sources(raw: &str) -> Result<Vec<Source>> {
    csv_rows(raw, SOURCES_FIELDS, "sources")?
        .into_iter()
        .map(|row| {
            let mode = source_mode(&row[0])
                .ok_or_else(|| Error::Parse(format!("invalid chrony source mode '{}'", row[0])))?;
            let status = source_status(&row[1])
                .ok_or_else(|| Error::Parse(format!("invalid chrony source status '{}'", row[1])))?;
            Ok(Source {
                mode,
                status,
                poll: number(&row[4], "poll")?,
                reach: number(&row[5], "reach")?,
                last_received: number(&row[6], "last rx")?,
                original_offset: number(&row[7], "adjusted offset")?,
                measured_offset: number(&row[8], "measured offset")?,
                offset_margin: number(&row[9], "offset margin")?,
                ref_host: row[2].clone(),
                stratum: row[3].clone(),
            })
        })
        .collect()
}

/// `chronyc -c sourcestats`: one line of 8 fields per source.
pub fn parse_sourcestats(raw: &str) -> Result<Vec<SourceStats>> {
    csv_rows(raw, SOURCESTATS_FIELDS, "sourcestats")?
        .into_iter()
        .map(|row| {
            Ok(SourceStats {
                sample_points: number(&row[1], "samples")?,
                residual_runs: number(&row[2], "runs")?,
                span: number(&row[3], "span")?,
                frequency: number(&row[4], "frequency")?,
                frequency_skew: number(&row[5], "frequency skew")?,
                std_dev: number(&row[6], "std dev")?,
                ref_host: row[0].clone(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ChronyCollector;

impl ChronyCollector {
    pub fn new() -> Self {
        Self
    }

    fn chronyc(runner: &dyn CommandRunner, report: &str) -> Result<String> {
        let spec = CommandSpec::new(CHRONYC).args(["-c", report]).check_status();
        Ok(runner.run(&spec)?.stdout)
    }

    fn record_tracking(agg: &mut MetricAggregator, tracking: &Tracking) -> Result<()> {
        agg.describe(
            "tracking_reference_info",
            "The stratum of the current preferred source",
            MetricKind::Gauge,
        )
        .describe(
            "tracking_stratum",
            "The stratum of the current preferred source",
            MetricKind::Gauge,
        )
        .describe(
            "tracking_system_offset_seconds",
            "The current estimated drift of system time from true time",
            MetricKind::Gauge,
        )
        .describe(
            "tracking_last_offset_seconds",
            "The estimated local offset on the last clock update.",
            MetricKind::Gauge,
        )
        .describe(
            "tracking_root_dispersion_seconds",
            "The absolute bound on the computer's clock accuracy",
            MetricKind::Gauge,
        );

        let reference = labels! {
            "ref_id" => &tracking.ref_id,
            "ref_host" => &tracking.ref_host,
        };
        agg.record("tracking_reference_info", reference, 1.0)?;
        agg.record("tracking_stratum", Labels::new(), tracking.stratum)?;
        agg.record("tracking_system_offset_seconds", Labels::new(), tracking.system_offset)?;
        agg.record("tracking_last_offset_seconds", Labels::new(), tracking.last_offset)?;
        agg.record(
            "tracking_root_dispersion_seconds",
            Labels::new(),
            tracking.root_dispersion,
        )
    }

    fn record_sources(agg: &mut MetricAggregator, sources: &[Source]) -> Result<()> {
        let gauges: [(&str, &str, fn(&Source) -> f64); 6] = [
            (
                "source_poll_rate_seconds",
                "The rate at which the source is being polled",
                |s| 2f64.powf(s.poll),
            ),
            (
                "source_reach_register",
                "The source reachability register",
                |s| s.reach,
            ),
            (
                "source_last_received_seconds",
                "Number of seconds ago the last sample was received from the source",
                |s| s.last_received,
            ),
            (
                "source_original_offset_seconds",
                "The adjusted offset between the local clock and the source",
                |s| s.original_offset,
            ),
            (
                "source_measured_offset_seconds",
                "The actual measured offset between the local clock and the source",
                |s| s.measured_offset,
            ),
            (
                "source_offset_margin_seconds",
                "The error margin in the offset measurement between the local clock and the source",
                |s| s.offset_margin,
            ),
        ];

        agg.describe("source_peer_info", "Peer information", MetricKind::Gauge);
        for (name, help, _) in &gauges {
            agg.describe(name, help, MetricKind::Gauge);
        }

        for source in sources {
            let peer = labels! {
                "ref_host" => &source.ref_host,
                "stratum" => &source.stratum,
                "mode" => source.mode,
                "status" => source.status,
            };
            agg.record("source_peer_info", peer, 1.0)?;

            let host = labels! { "ref_host" => &source.ref_host };
            for (name, _, value) in &gauges {
                agg.record(name, host.clone(), value(source))?;
            }
        }
        Ok(())
    }

    fn record_sourcestats(agg: &mut MetricAggregator, stats: &[SourceStats]) -> Result<()> {
        let gauges: [(&str, &str, fn(&SourceStats) -> f64); 6] = [
            (
                "source_sample_points",
                "The number of sample points currently being retained for the server",
                |s| s.sample_points,
            ),
            (
                "source_residual_runs",
                "The number of runs of residuals having the same sign following the last regression",
                |s| s.residual_runs,
            ),
            (
                "source_sample_interval_span_seconds",
                "The interval between the oldest and newest samples",
                |s| s.span,
            ),
            (
                "source_frequency_ppm",
                "The estimated residual frequency for the server",
                |s| s.frequency,
            ),
            (
                "source_frequency_skew_ppm",
                "The estimated error bounds on the residual frequency estimation",
                |s| s.frequency_skew,
            ),
            (
                "source_std_dev_seconds",
                "The estimated sample standard deviation.",
                |s| s.std_dev,
            ),
        ];

        for (name, help, _) in &gauges {
            agg.describe(name, help, MetricKind::Gauge);
        }
        for stat in stats {
            let host = labels! { "ref_host" => &stat.ref_host };
            for (name, _, value) in &gauges {
                agg.record(name, host.clone(), value(stat))?;
            }
        }
        Ok(())
    }
}

impl Collector for ChronyCollector {
    fn name(&self) -> &'static str {
        "chrony-metrics"
    }

    fn namespace(&self) -> &'static str {
        "chrony_"
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(CHRONYC).arg("--version"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let runner = runner.as_ref();
        let tracking = parse_tracking(&Self::chronyc(runner, "tracking")?)?;
        let sources = parse_sources(&Self::chronyc(runner, "sources")?)?;
        let stats = parse_sourcestats(&Self::chronyc(runner, "sourcestats")?)?;

        let mut agg = MetricAggregator::new();
        Self::record_tracking(&mut agg, &tracking)?;
        Self::record_sources(&mut agg, &sources)?;
        Self::record_sourcestats(&mut agg, &stats)?;
        Ok(agg)
    }
}
