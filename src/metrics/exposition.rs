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

//! Prometheus text exposition format output.

use std::borrow::Cow;

use crate::metrics::model::{MetricFamily, MetricKind};

/// Helper struct to build Prometheus metrics text line by line.
#[derive(Debug, Default)]
pub struct MetricBuilder {
    metrics: String,
}

impl MetricBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a HELP line
    pub fn help(&mut self, name: &str, description: &str) -> &mut Self {
        let description = escape_help(description);
        self.metrics
            .push_str(&format!("# HELP {name} {description}\n"));
        self
    }

    /// Add a TYPE line
    pub fn type_(&mut self, name: &str, metric_type: MetricKind) -> &mut Self {
        self.metrics
            .push_str(&format!("# TYPE {name} {metric_type}\n"));
        self
    }

    /// Add a metric line with labels
    pub fn metric<'a>(
        &mut self,
        name: &str,
        labels: impl IntoIterator<Item = (&'a str, &'a str)>,
        value: f64,
    ) -> &mut Self {
        self.metrics.push_str(name);

        let mut labels = labels.into_iter().peekable();
        if labels.peek().is_some() {
            self.metrics.push('{');
            for (i, (key, value)) in labels.enumerate() {
                if i > 0 {
                    self.metrics.push(',');
                }
                let escaped_value = escape_label_value(value);
                self.metrics.push_str(&format!("{key}=\"{escaped_value}\""));
            }
            self.metrics.push('}');
        }

        self.metrics.push(' ');
        self.metrics.push_str(&format_value(value));
        self.metrics.push('\n');
        self
    }

    /// Build the final metric string
    pub fn build(self) -> String {
        self.metrics
    }
}

/// Renders finished metric families, prefixing every name with a namespace.
#[derive(Debug, Clone, Default)]
pub struct ExpositionFormatter {
    namespace: String,
}

impl ExpositionFormatter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// One HELP and one TYPE line per family, immediately followed by all of
    /// its samples. Label order is the order the labels were declared in.
    pub fn render(&self, families: &[MetricFamily]) -> String {
        let mut builder = MetricBuilder::new();
        for family in families {
            let name = format!("{}{}", self.namespace, family.name);
            builder
                .help(&name, &family.help)
                .type_(&name, family.kind);
            for sample in &family.samples {
                builder.metric(&name, sample.labels().iter(), sample.value());
            }
        }
        builder.build()
    }
}

/// Escape a label value: backslash, double quote and line feed.
pub fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape HELP text: backslash and line feed.
pub fn escape_help(help: &str) -> Cow<'_, str> {
    if !help.contains(['\\', '\n']) {
        return Cow::Borrowed(help);
    }
    Cow::Owned(help.replace('\\', "\\\\").replace('\n', "\\n"))
}

/// Integral values are written without a fractional part.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let inf = if value > 0.0 { "+Inf" } else { "-Inf" };
        inf.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
