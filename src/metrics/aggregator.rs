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

//! Groups samples into metric families.
//!
//! Input order is not significant. Families come out sorted by name so the
//! rendered text is stable across runs; samples keep the order in which
//! their series were first seen.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::error::Result;
use crate::metrics::model::{Labels, MetricFamily, MetricKind, MetricSample};

/// How to treat families whose samples carry different label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// Emit every sample with exactly the labels it was recorded with.
    #[default]
    Lenient,
    /// Give every sample of a family the union of the family's label names,
    /// filling absent ones with an empty string.
    Uniform,
}

#[derive(Debug, Default)]
struct FamilyEntry {
    help: Option<String>,
    kind: MetricKind,
    samples: Vec<MetricSample>,
    positions: HashMap<Vec<(String, String)>, usize>,
}

impl FamilyEntry {
    /// Last write wins for an identical label set; the series keeps the
    /// position of its first occurrence.
    fn insert(&mut self, sample: MetricSample) {
        let identity = sample.labels().identity();
        match self.positions.get(&identity) {
            Some(&index) => {
                trace!(family = sample.family(), "overwriting duplicate series");
                self.samples[index] = sample;
            }
            None => {
                self.positions.insert(identity, self.samples.len());
                self.samples.push(sample);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MetricAggregator {
    families: BTreeMap<String, FamilyEntry>,
    policy: LabelPolicy,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: LabelPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> LabelPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: LabelPolicy) {
        self.policy = policy;
    }

    /// Register HELP text and type for a family.
    pub fn describe(&mut self, name: &str, help: &str, kind: MetricKind) -> &mut Self {
        let entry = self.families.entry(name.to_string()).or_default();
        entry.help = Some(help.to_string());
        entry.kind = kind;
        self
    }

    pub fn push(&mut self, sample: MetricSample) {
        self.families
            .entry(sample.family().to_string())
            .or_default()
            .insert(sample);
    }

    /// Build and push a sample in one step.
    pub fn record(&mut self, name: &str, labels: Labels, value: f64) -> Result<()> {
        self.push(MetricSample::new(name, labels, value)?);
        Ok(())
    }

    /// Guarantee the family exists: when nothing was recorded for it, add a
    /// single series with every label set to `""` and value 0.
    pub fn placeholder(&mut self, name: &str, label_names: &[&str]) -> Result<()> {
        let empty = self
            .families
            .get(name)
            .map_or(true, |entry| entry.samples.is_empty());
        if empty {
            let labels = label_names.iter().map(|n| (*n, "")).collect();
            self.record(name, labels, 0.0)?;
        }
        Ok(())
    }

    /// Fold the results of another aggregator into this one, e.g. the output
    /// of one parallel device probe. Metadata already present here wins.
    pub fn merge(&mut self, other: MetricAggregator) {
        for (name, entry) in other.families {
            let target = self.families.entry(name).or_default();
            if target.help.is_none() && entry.help.is_some() {
                target.help = entry.help;
                target.kind = entry.kind;
            }
            for sample in entry.samples {
                target.insert(sample);
            }
        }
    }

    /// Value of the series with exactly these labels, if recorded.
    pub fn get(&self, name: &str, labels: &Labels) -> Option<f64> {
        let entry = self.families.get(name)?;
        let index = entry.positions.get(&labels.identity())?;
        Some(entry.samples[*index].value())
    }

    pub fn sample_count(&self) -> usize {
        self.families.values().map(|e| e.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Families with at least one sample, sorted by name.
    pub fn finish(self) -> Vec<MetricFamily> {
        let policy = self.policy;
        self.families
            .into_iter()
            .filter(|(_, entry)| !entry.samples.is_empty())
            .map(|(name, entry)| {
                let samples = match policy {
                    LabelPolicy::Lenient => entry.samples,
                    LabelPolicy::Uniform => backfill_labels(entry.samples),
                };
                MetricFamily {
                    help: entry.help.unwrap_or_else(|| name.clone()),
                    name,
                    kind: entry.kind,
                    samples,
                }
            })
            .collect()
    }
}

impl Extend<MetricSample> for MetricAggregator {
    fn extend<T: IntoIterator<Item = MetricSample>>(&mut self, iter: T) {
        for sample in iter {
            self.push(sample);
        }
    }
}

fn backfill_labels(samples: Vec<MetricSample>) -> Vec<MetricSample> {
    let mut names: Vec<String> = Vec::new();
    for sample in &samples {
        for name in sample.labels().names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    samples
        .into_iter()
        .map(|sample| {
            if sample.labels().len() == names.len() {
                return sample;
            }
            let labels: Labels = names
                .iter()
                .map(|n| (n.clone(), sample.labels().get(n).unwrap_or("").to_string()))
                .collect();
            sample.with_labels(labels)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(family: &str, labels: &[(&str, &str)], value: f64) -> MetricSample {
        MetricSample::new(family, labels.iter().copied().collect(), value).unwrap()
    }

    #[test]
    fn test_families_sorted_by_name() {
        let mut agg = MetricAggregator::new();
        agg.push(sample("b_metric", &[], 1.0));
        agg.push(sample("a_metric", &[], 2.0));
        let names: Vec<_> = agg.finish().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a_metric", "b_metric"]);
    }

    #[test]
    fn test_duplicate_series_last_wins_first_position() {
        let mut agg = MetricAggregator::new();
        agg.push(sample("temp", &[("device", "sda")], 30.0));
        agg.push(sample("temp", &[("device", "sdb")], 31.0));
        agg.push(sample("temp", &[("device", "sda")], 35.0));

        let families = agg.finish();
        assert_eq!(families.len(), 1);
        let values: Vec<_> = families[0]
            .samples
            .iter()
            .map(|s| (s.labels().get("device").unwrap().to_string(), s.value()))
            .collect();
        assert_eq!(
            values,
            vec![("sda".to_string(), 35.0), ("sdb".to_string(), 31.0)]
        );
    }

    #[test]
    fn test_placeholder_only_when_empty() {
        let mut agg = MetricAggregator::new();
        agg.describe("updates", "pending updates", MetricKind::Gauge);
        agg.placeholder("updates", &["repository", "package-name"])
            .unwrap();
        let families = agg.finish();
        assert_eq!(families[0].samples.len(), 1);
        assert_eq!(families[0].samples[0].value(), 0.0);
        assert_eq!(families[0].samples[0].labels().get("repository"), Some(""));

        let mut agg = MetricAggregator::new();
        agg.record("updates", Labels::new().with("repository", "oss"), 1.0)
            .unwrap();
        agg.placeholder("updates", &["repository"]).unwrap();
        assert_eq!(agg.sample_count(), 1);
    }

    #[test]
    fn test_described_family_without_samples_is_dropped() {
        let mut agg = MetricAggregator::new();
        agg.describe("unused", "never recorded", MetricKind::Counter);
        assert!(agg.finish().is_empty());
    }

    #[test]
    fn test_merge_keeps_metadata_and_dedups() {
        let mut left = MetricAggregator::new();
        left.describe("errors_total", "error count", MetricKind::Counter);
        left.push(sample("errors_total", &[("device", "nvme0n1")], 1.0));

        let mut right = MetricAggregator::new();
        right.push(sample("errors_total", &[("device", "nvme0n1")], 2.0));
        right.push(sample("errors_total", &[("device", "nvme1n1")], 0.0));

        left.merge(right);
        let families = left.finish();
        assert_eq!(families[0].help, "error count");
        assert_eq!(families[0].kind, MetricKind::Counter);
        assert_eq!(families[0].samples.len(), 2);
        assert_eq!(families[0].samples[0].value(), 2.0);
    }

    #[test]
    fn test_uniform_policy_backfills() {
        let mut agg = MetricAggregator::with_policy(LabelPolicy::Uniform);
        agg.push(sample("info", &[("device", "sda")], 1.0));
        agg.push(sample("info", &[("device", "sdb"), ("vendor", "ACME")], 1.0));
        let families = agg.finish();
        let first = &families[0].samples[0];
        assert_eq!(first.labels().get("vendor"), Some(""));
        let names: Vec<_> = first.labels().names().collect();
        assert_eq!(names, vec!["device", "vendor"]);
    }

    #[test]
    fn test_lenient_policy_keeps_heterogeneous_labels() {
        let mut agg = MetricAggregator::new();
        agg.push(sample("info", &[("device", "sda")], 1.0));
        agg.push(sample("info", &[("device", "sdb"), ("vendor", "ACME")], 1.0));
        let families = agg.finish();
        assert_eq!(families[0].samples[0].labels().len(), 1);
    }

    #[test]
    fn test_get_ignores_label_order() {
        let mut agg = MetricAggregator::new();
        agg.push(sample("m", &[("a", "1"), ("b", "2")], 7.0));
        let lookup: Labels = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(agg.get("m", &lookup), Some(7.0));
    }
}
