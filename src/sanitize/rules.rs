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

//! Classification rules: which transform turns a raw value into a number,
//! and which family the result belongs to.

use regex::Regex;

use crate::metrics::MetricKind;
use crate::parsing::common::{leading_number, parse_strict_f64};

/// How a raw textual value becomes a sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Contains `OK` (case-sensitive) → 1, anything else (including empty) → 0.
    Status,
    /// Contains `None` → 0, anything else → 1.
    Errors,
    /// Leading numeric token, ignoring a trailing `%` and descriptive text.
    Percentage,
    /// The value as written, if it is a number.
    Numeric,
    /// Yes/no style flags.
    Boolean,
}

impl Transform {
    /// `None` means the value is unrecognized and the record is dropped.
    pub fn apply(self, value: &str) -> Option<f64> {
        match self {
            Transform::Status => Some(if value.contains("OK") { 1.0 } else { 0.0 }),
            Transform::Errors => Some(if value.contains("None") { 0.0 } else { 1.0 }),
            Transform::Percentage => leading_number(value),
            Transform::Numeric => parse_strict_f64(value),
            Transform::Boolean => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "enabled" | "available" | "on" => Some(1.0),
                "false" | "no" | "disabled" | "unavailable" | "off" => Some(0.0),
                _ => None,
            },
        }
    }
}

/// Match condition on a normalized key.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    Regex(Regex),
}

impl Pattern {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Pattern::Exact(p) => key == p,
            Pattern::Contains(p) => key.contains(p.as_str()),
            Pattern::Prefix(p) => key.starts_with(p.as_str()),
            Pattern::Suffix(p) => key.ends_with(p.as_str()),
            Pattern::Regex(re) => re.is_match(key),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub transform: Transform,
    /// Family name to use instead of the normalized key.
    pub family: Option<String>,
    pub kind: MetricKind,
    pub help: Option<String>,
    /// Linear conversion applied after the transform: `value * scale + offset`.
    pub scale: f64,
    pub offset: f64,
}

impl Rule {
    pub fn new(pattern: Pattern, transform: Transform) -> Self {
        Self {
            pattern,
            transform,
            family: None,
            kind: MetricKind::Gauge,
            help: None,
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Transform `raw` and apply the linear conversion.
    pub fn convert(&self, raw: &str) -> Option<f64> {
        self.transform
            .apply(raw)
            .map(|value| value * self.scale + self.offset)
    }

    pub fn exact(key: &str, transform: Transform) -> Self {
        Self::new(Pattern::Exact(key.to_string()), transform)
    }

    pub fn contains(needle: &str, transform: Transform) -> Self {
        Self::new(Pattern::Contains(needle.to_string()), transform)
    }

    pub fn prefix(prefix: &str, transform: Transform) -> Self {
        Self::new(Pattern::Prefix(prefix.to_string()), transform)
    }

    pub fn suffix(suffix: &str, transform: Transform) -> Self {
        Self::new(Pattern::Suffix(suffix.to_string()), transform)
    }

    pub fn regex(re: Regex, transform: Transform) -> Self {
        Self::new(Pattern::Regex(re), transform)
    }

    pub fn family(mut self, family: &str) -> Self {
        self.family = Some(family.to_string());
        self
    }

    pub fn counter(mut self) -> Self {
        self.kind = MetricKind::Counter;
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

/// Ordered `(pattern, transform)` table. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn classify(&self, key: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.pattern.matches(key))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
