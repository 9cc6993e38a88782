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

//! HP Smart Array controller and physical drive health via `ssacli`.

use std::sync::Arc;

use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::cli::CommonArgs;
use crate::error::Result;
use crate::metrics::MetricAggregator;
use crate::parsing::{LineParser, Separator};
use crate::runner::CommandSpec;
use crate::sanitize::{Rule, RuleTable, Sanitizer, Transform};
use crate::traits::{Collector, CommandRunner};

const SSACLI: &str = "ssacli";

static SLOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"in Slot (\S+)").expect("valid slot regex"));

/// Classification of `Key: value` detail lines, first match wins.
fn detail_rules() -> RuleTable {
    RuleTable::new()
        .rule(Rule::suffix("status", Transform::Status))
        .rule(Rule::suffix("errors", Transform::Errors))
        .rule(Rule::exact("usage_remaining", Transform::Percentage))
        .rule(Rule::exact("cache_ratio", Transform::Percentage))
        .rule(Rule::contains("temperature", Transform::Numeric))
        .rule(Rule::suffix("hours", Transform::Numeric))
        .rule(Rule::suffix("count", Transform::Numeric))
        .rule(Rule::prefix("number_of_", Transform::Numeric))
        .rule(Rule::regex(
            Regex::new(r"(^|_)(supported|supports|support|enabled|present|wearout|exposed_to_os|encryption)(_|$)")
                .expect("valid flag regex"),
            Transform::Boolean,
        ))
}

static CONTROLLER: Lazy<Sanitizer> = Lazy::new(|| Sanitizer::new(detail_rules()));

static DRIVE: Lazy<Sanitizer> = Lazy::new(|| Sanitizer::new(detail_rules()).prefix("drive_"));

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Expose HP Smart Array metrics in Prometheus text format", long_about = None)]
pub struct SsacliArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Controller slots from `ssacli ctrl all show`.
pub fn parse_slots(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| SLOT_RE.captures(line).map(|caps| caps[1].to_string()))
        .collect()
}

/// Split `pd all show detail` output into `(drive id, detail text)` sections.
pub fn split_drives(raw: &str) -> Vec<(String, String)> {
    let mut drives: Vec<(String, String)> = Vec::new();
    for line in raw.lines() {
        if let Some(id) = line.trim().strip_prefix("physicaldrive ") {
            drives.push((id.trim().to_string(), String::new()));
        } else if let Some((_, body)) = drives.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    drives
}

fn detail_parser() -> LineParser {
    LineParser::new(Separator::Colon).require(": ")
}

#[derive(Debug, Clone, Default)]
pub struct SsacliCollector;

impl SsacliCollector {
    pub fn new() -> Self {
        Self
    }

    fn ssacli(runner: &dyn CommandRunner, args: &[&str]) -> Result<String> {
        let spec = CommandSpec::new(SSACLI)
            .args(args.iter().copied())
            .check_status();
        Ok(runner.run(&spec)?.stdout)
    }

    fn collect_slot(runner: &dyn CommandRunner, slot: &str, agg: &mut MetricAggregator) -> Result<()> {
        let selector = format!("slot={slot}");
        let parser = detail_parser();

        let controller = Self::ssacli(runner, &["ctrl", selector.as_str(), "show", "detail"])?;
        let produced = CONTROLLER.sanitize_into(
            parser.records(&controller),
            &labels! { "slot" => slot },
            agg,
        );
        debug!(slot, produced, "controller details");

        let drives = Self::ssacli(
            runner,
            &["ctrl", selector.as_str(), "pd", "all", "show", "detail"],
        )?;
        for (drive, detail) in split_drives(&drives) {
            let labels = labels! { "slot" => slot, "drive" => &drive };
            DRIVE.sanitize_into(parser.records(&detail), &labels, agg);
        }
        Ok(())
    }
}

impl Collector for SsacliCollector {
    fn name(&self) -> &'static str {
        "ssacli-metrics"
    }

    fn namespace(&self) -> &'static str {
        "hpsa_"
    }

    fn requires_root(&self) -> bool {
        true
    }

    fn tool_probe(&self) -> Option<CommandSpec> {
        Some(CommandSpec::new(SSACLI).arg("version"))
    }

    async fn collect(&self, runner: Arc<dyn CommandRunner>) -> Result<MetricAggregator> {
        let runner = runner.as_ref();
        let slots = parse_slots(&Self::ssacli(runner, &["ctrl", "all", "show"])?);
        debug!(slots = slots.len(), "discovered Smart Array controllers");

        let mut agg = MetricAggregator::new();
        for slot in &slots {
            Self::collect_slot(runner, slot, &mut agg)?;
        }
        Ok(agg)
    }
}
