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

//! Properties of the parse, sanitize, aggregate and format pipeline.

use textfile_collectors::labels;
use textfile_collectors::metrics::{
    ExpositionFormatter, LabelPolicy, Labels, MetricAggregator, MetricKind, MetricSample,
};
use textfile_collectors::parsing::{LineParser, RawRecord, Separator};
use textfile_collectors::sanitize::{Rule, RuleTable, Sanitizer, SentinelTable, Transform};

fn render(agg: MetricAggregator, namespace: &str) -> String {
    ExpositionFormatter::new(namespace).render(&agg.finish())
}

/// Undo the `\\`, `\"` and `\n` label value escapes.
fn unescape(value: &str) -> String {
    let mut out = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[test]
fn test_families_sorted_by_name() {
    let mut agg = MetricAggregator::new();
    agg.record("b_metric", Labels::new(), 1.0).unwrap();
    agg.record("a_metric", Labels::new(), 2.0).unwrap();

    let text = render(agg, "");
    let a = text.find("# HELP a_metric").unwrap();
    let b = text.find("# HELP b_metric").unwrap();
    assert!(a < b);
}

#[test]
fn test_duplicate_series_last_wins() {
    let mut agg = MetricAggregator::new();
    agg.record("drive_status", labels! { "slot" => "0", "drive" => "1I:1:1" }, 1.0)
        .unwrap();
    agg.record("drive_status", labels! { "slot" => "0", "drive" => "1I:1:2" }, 1.0)
        .unwrap();
    agg.record("drive_status", labels! { "slot" => "0", "drive" => "1I:1:1" }, 0.0)
        .unwrap();

    let text = render(agg, "hpsa_");
    assert_eq!(text.matches("# HELP hpsa_drive_status").count(), 1);
    assert_eq!(
        text.lines().filter(|l| l.starts_with("hpsa_drive_status{")).collect::<Vec<_>>(),
        vec![
            "hpsa_drive_status{slot=\"0\",drive=\"1I:1:1\"} 0",
            "hpsa_drive_status{slot=\"0\",drive=\"1I:1:2\"} 1",
        ]
    );
}

#[test]
fn test_label_escaping_round_trip() {
    let raw = "Model \"X\" C:\\disk\nrev 2";
    let mut agg = MetricAggregator::new();
    agg.record("device_info", labels! { "model" => raw }, 1.0).unwrap();

    let text = render(agg, "smartmon_");
    assert_eq!(text.lines().count(), 3, "escaped newline must not split the sample");

    let scrape = prometheus_parse::Scrape::parse(text.lines().map(|s| Ok(s.to_owned())))
        .expect("Failed to parse Prometheus output");
    assert_eq!(scrape.samples.len(), 1);
    let sample = &scrape.samples[0];
    assert_eq!(sample.metric, "smartmon_device_info");

    // prometheus-parse strips the quotes but leaves escapes in place
    let model = sample.labels.get("model").expect("Expected model label");
    assert_eq!(unescape(model), raw);
}

#[test]
fn test_uniform_labels_backfill() {
    let mut agg = MetricAggregator::with_policy(LabelPolicy::Uniform);
    agg.record("attr_value", labels! { "device" => "/dev/sda" }, 100.0)
        .unwrap();
    agg.record(
        "attr_value",
        labels! { "device" => "/dev/sdb", "name" => "power_on_hours" },
        95.0,
    )
    .unwrap();

    let text = render(agg, "smartmon_");
    assert!(text.contains("smartmon_attr_value{device=\"/dev/sda\",name=\"\"} 100\n"));
    assert!(text.contains("smartmon_attr_value{device=\"/dev/sdb\",name=\"power_on_hours\"} 95\n"));
}

#[test]
fn test_lenient_labels_kept_as_recorded() {
    let mut agg = MetricAggregator::new();
    agg.record("attr_value", labels! { "device" => "/dev/sda" }, 100.0)
        .unwrap();
    let text = render(agg, "smartmon_");
    assert!(text.contains("smartmon_attr_value{device=\"/dev/sda\"} 100\n"));
}

#[test]
fn test_invalid_names_rejected() {
    assert!(MetricSample::new("9lives", Labels::new(), 1.0).is_err());
    assert!(MetricSample::new("ok_name", labels! { "bad label" => "x" }, 1.0).is_err());
}

#[test]
fn test_controller_details_through_pipeline() {
    let output = "\
Smart Array P440ar in Slot 0 (Embedded)
   Controller Status: OK
   Cache Status: Failed
   Battery/Capacitor Status: OK
   Errors: None
   Usage remaining: 87%
   Free Space:   42 % free
   Serial Number: PDNLH0BRH9D1ZG
";
    let rules = RuleTable::new()
        .rule(Rule::suffix("status", Transform::Status))
        .rule(Rule::suffix("errors", Transform::Errors))
        .rule(Rule::exact("usage_remaining", Transform::Percentage))
        .rule(Rule::exact("free_space", Transform::Percentage).help("Free space in percent"));
    let sanitizer = Sanitizer::new(rules);
    let parser = LineParser::new(Separator::Colon).require(": ");

    let slot = labels! { "slot" => "0" };
    let mut agg = MetricAggregator::new();
    let produced = sanitizer.sanitize_into(parser.records(output), &slot, &mut agg);
    assert_eq!(produced, 6);

    let text = render(agg, "hpsa_");
    assert!(text.contains("hpsa_controller_status{slot=\"0\"} 1\n"));
    assert!(text.contains("hpsa_cache_status{slot=\"0\"} 0\n"));
    assert!(text.contains("hpsa_errors{slot=\"0\"} 0\n"));
    assert!(text.contains("hpsa_usage_remaining{slot=\"0\"} 87\n"));
    assert!(text.contains("# HELP hpsa_free_space Free space in percent\n"));
    assert!(text.contains("hpsa_free_space{slot=\"0\"} 42\n"));
    assert!(!text.contains("serial"));
}

#[test]
fn test_sentinel_overrides_transform() {
    let rules = RuleTable::new().rule(Rule::exact("power_mode", Transform::Numeric));
    let sanitizer =
        Sanitizer::new(rules).sentinels(SentinelTable::new().with("standby", -1.0));

    let sample = sanitizer
        .sanitize(&RawRecord::new("Power mode", "STANDBY"), &Labels::new())
        .unwrap();
    assert_eq!(sample.value(), -1.0);
    assert!(sanitizer
        .sanitize(&RawRecord::new("Power mode", ""), &Labels::new())
        .is_none());
}

#[test]
fn test_counter_type_line() {
    let mut agg = MetricAggregator::new();
    agg.describe("media_errors_total", "Device media errors total", MetricKind::Counter);
    agg.record("media_errors_total", labels! { "device" => "nvme0n1" }, 0.0)
        .unwrap();
    let text = render(agg, "nvme_");
    assert!(text.contains("# TYPE nvme_media_errors_total counter\n"));
}

#[test]
fn test_empty_aggregator_renders_nothing() {
    let mut agg = MetricAggregator::new();
    agg.describe("unused", "never recorded", MetricKind::Gauge);
    assert_eq!(render(agg, "x_"), "");
}
