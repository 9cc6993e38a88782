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

/// Explicit values for degenerate device states.
///
/// Some states carry no measurement but must still be distinguishable from
/// zero, e.g. a disk left asleep so it is not spun up by the probe. Entries
/// match case-insensitively as substrings of the raw value and take
/// precedence over the transform.
#[derive(Debug, Clone, Default)]
pub struct SentinelTable {
    entries: Vec<(String, f64)>,
}

impl SentinelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, marker: &str, value: f64) -> Self {
        self.entries.push((marker.to_ascii_lowercase(), value));
        self
    }

    pub fn lookup(&self, raw: &str) -> Option<f64> {
        let raw = raw.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(marker, _)| raw.contains(marker.as_str()))
            .map(|(_, value)| *value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
