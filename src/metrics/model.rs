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

//! Metric data model shared by the sanitizer, aggregator and formatter.

use std::fmt;

use crate::error::{Error, Result};

/// Prometheus metric type of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `^[a-zA-Z_:][a-zA-Z0-9_:]*$`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `^[a-zA-Z_][a-zA-Z0-9_]*$`, additionally accepting `-` after the first
/// character so the established zypper series (`package-name`, ...) keep
/// their names.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Ordered label set. Names are unique; inserting an existing name replaces
/// its value in place and keeps the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Builder form of [`Labels::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Order independent identity of the label set.
    pub(crate) fn identity(&self) -> Vec<(String, String)> {
        let mut pairs = self.0.clone();
        pairs.sort();
        pairs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut labels = Labels::new();
        for (k, v) in iter {
            labels.insert(k, v);
        }
        labels
    }
}

/// One series: family name, label set and value. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    family: String,
    labels: Labels,
    value: f64,
}

impl MetricSample {
    /// Build a sample, rejecting names the exposition format cannot carry.
    pub fn new(family: impl Into<String>, labels: Labels, value: f64) -> Result<Self> {
        let family = family.into();
        if !is_valid_metric_name(&family) {
            return Err(Error::InvalidMetric(format!(
                "invalid metric name '{family}'"
            )));
        }
        if let Some(bad) = labels.names().find(|name| !is_valid_label_name(name)) {
            return Err(Error::InvalidMetric(format!(
                "invalid label name '{bad}' on '{family}'"
            )));
        }
        Ok(Self {
            family,
            labels,
            value,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn with_labels(&self, labels: Labels) -> Self {
        Self {
            family: self.family.clone(),
            labels,
            value: self.value,
        }
    }
}

/// A named group of samples declared once through HELP/TYPE.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<MetricSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name_validation() {
        assert!(is_valid_metric_name("smartmon_device_active"));
        assert!(is_valid_metric_name("node:reboot_required"));
        assert!(is_valid_metric_name("_private"));
        assert!(!is_valid_metric_name("9lives"));
        assert!(!is_valid_metric_name("bad-name"));
        assert!(!is_valid_metric_name(""));
    }

    #[test]
    fn test_label_name_validation() {
        assert!(is_valid_label_name("device"));
        assert!(is_valid_label_name("package-name"));
        assert!(!is_valid_label_name("-leading"));
        assert!(!is_valid_label_name("has:colon"));
        assert!(!is_valid_label_name("1st"));
    }

    #[test]
    fn test_labels_replace_in_place() {
        let mut labels = Labels::new().with("device", "nvme0n1").with("slot", "0");
        labels.insert("device", "nvme1n1");
        let pairs: Vec<_> = labels.iter().collect();
        assert_eq!(pairs, vec![("device", "nvme1n1"), ("slot", "0")]);
    }

    #[test]
    fn test_labels_identity_ignores_order() {
        let a: Labels = [("a", "1"), ("b", "2")].into_iter().collect();
        let b: Labels = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_ne!(a, b);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_sample_rejects_invalid_names() {
        assert!(MetricSample::new("ok_name", Labels::new(), 1.0).is_ok());
        assert!(matches!(
            MetricSample::new("bad name", Labels::new(), 1.0),
            Err(Error::InvalidMetric(_))
        ));
        let labels = Labels::new().with("0bad", "x");
        assert!(MetricSample::new("ok_name", labels, 1.0).is_err());
    }
}
