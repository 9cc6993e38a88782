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

//! Key/Value Sanitizer: raw records to typed samples.
//!
//! A raw key is normalized into a metric-name fragment, classified against
//! an ordered [`RuleTable`], and its value converted by the matching
//! [`Transform`]. Records that match no rule, or whose value the transform
//! does not recognize, are dropped without error.

pub mod rules;
pub mod sentinel;

use tracing::debug;

use crate::metrics::{Labels, MetricAggregator, MetricSample};
use crate::parsing::RawRecord;

pub use rules::{Pattern, Rule, RuleTable, Transform};
pub use sentinel::SentinelTable;

/// Lowercase, fold every run of non-alphanumeric characters into a single
/// `_`, trim `_` at both ends, and prefix a leading digit with `_`.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    rules: RuleTable,
    sentinels: SentinelTable,
    prefix: String,
}

impl Sanitizer {
    pub fn new(rules: RuleTable) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn sentinels(mut self, sentinels: SentinelTable) -> Self {
        self.sentinels = sentinels;
        self
    }

    /// Prefix for every family produced, e.g. `drive_`.
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    fn classify(&self, record: &RawRecord) -> Option<(String, &Rule, f64)> {
        let key = normalize_key(&record.key);
        let rule = self.rules.classify(&key)?;
        let value = self
            .sentinels
            .lookup(&record.value)
            .or_else(|| rule.convert(&record.value))?;
        let family = format!(
            "{}{}",
            self.prefix,
            rule.family.as_deref().unwrap_or(key.as_str())
        );
        Some((family, rule, value))
    }

    /// Zero or one sample for `record`, carrying `labels`.
    pub fn sanitize(&self, record: &RawRecord, labels: &Labels) -> Option<MetricSample> {
        let (family, _, value) = self.classify(record)?;
        MetricSample::new(family, labels.clone(), value)
            .map_err(|e| debug!(key = %record.key, error = %e, "dropping record"))
            .ok()
    }

    /// Sanitize every record and push the resulting samples, describing each
    /// family from its rule. Returns how many samples were produced.
    pub fn sanitize_into<I>(&self, records: I, labels: &Labels, agg: &mut MetricAggregator) -> usize
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut produced = 0;
        for record in records {
            let Some((family, rule, value)) = self.classify(&record) else {
                continue;
            };
            match MetricSample::new(family.as_str(), labels.clone(), value) {
                Ok(sample) => {
                    let help = rule
                        .help
                        .clone()
                        .unwrap_or_else(|| record.key.trim().to_string());
                    agg.describe(&family, &help, rule.kind);
                    agg.push(sample);
                    produced += 1;
                }
                Err(e) => debug!(key = %record.key, error = %e, "dropping record"),
            }
        }
        produced
    }
}
