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
//! Parsing macros for repeated construction patterns.

/// Build a [`Labels`](crate::metrics::Labels) set in declaration order.
///
/// ```
/// use textfile_collectors::labels;
///
/// let labels = labels! { "device" => "/dev/sda", "disk" => "0" };
/// assert_eq!(labels.get("disk"), Some("0"));
/// ```
#[macro_export]
macro_rules! labels {
    () => {
        $crate::metrics::Labels::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut labels = $crate::metrics::Labels::new();
        $(labels.insert($name, $value);)+
        labels
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_labels_declaration_order() {
        let labels = labels! { "slot" => "0", "drive" => "1I:1:1" };
        let names: Vec<_> = labels.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["slot", "drive"]);
    }

    #[test]
    fn test_empty_labels() {
        let labels = labels! {};
        assert!(labels.is_empty());
    }
}
