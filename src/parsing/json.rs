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

// JSON helpers for tools that offer a structured output format.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::parsing::lines::RawRecord;

/// Flatten a JSON document into records with dotted keys.
///
/// Nested objects contribute `parent.child` keys and array elements
/// `parent.<index>` keys. `null` leaves are skipped.
pub fn flatten_json(value: &Value) -> Vec<RawRecord> {
    let mut records = Vec::new();
    flatten_into(value, String::new(), &mut records);
    records
}

fn flatten_into(value: &Value, path: String, out: &mut Vec<RawRecord>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, child_path(&path, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, child_path(&path, &index.to_string()), out);
            }
        }
        Value::Null => {}
        Value::String(s) => out.push(RawRecord::new(path, s.clone())),
        Value::Bool(b) => out.push(RawRecord::new(path, b.to_string())),
        Value::Number(n) => out.push(RawRecord::new(path, n.to_string())),
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Get a JSON field by key, returning a parse error if not found.
pub fn json_get<'a>(v: &'a Value, key: &str) -> Result<&'a Value> {
    v.get(key)
        .ok_or_else(|| Error::Parse(format!("Missing JSON key '{key}'")))
}

/// Extract string from JSON, returning a parse error on failure.
pub fn json_string(v: &Value, key: &str) -> Result<String> {
    match json_get(v, key)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::Parse(format!(
            "Expected string at key '{key}', found: {other}"
        ))),
    }
}

/// Extract f64 from a JSON number or a numeric string.
///
/// Wide counters (128-bit in the NVMe log pages) are emitted as strings so
/// they survive JSON serialization; both spellings are accepted.
pub fn json_f64(v: &Value, key: &str) -> Result<f64> {
    match json_get(v, key)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::Parse(format!("JSON number at '{key}' not f64"))),
        Value::String(s) => crate::parsing::common::parse_number::<f64>(s)
            .ok_or_else(|| Error::Parse(format!("Failed to parse f64 from '{s}' at '{key}'"))),
        other => Err(Error::Parse(format!(
            "Expected f64 (number/string) at key '{key}', found: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested() {
        let v = json!({
            "critical_warning": { "value": 0 },
            "temperature": 310,
            "data_units_read": "123456789012345678901",
            "Devices": [ { "NameSpace": "nvme0n1" } ],
            "absent": null,
            "flag": true
        });
        let records = flatten_json(&v);
        let get = |k: &str| {
            records
                .iter()
                .find(|r| r.key == k)
                .map(|r| r.value.clone())
        };
        assert_eq!(get("critical_warning.value"), Some("0".to_string()));
        assert_eq!(get("temperature"), Some("310".to_string()));
        assert_eq!(get("Devices.0.NameSpace"), Some("nvme0n1".to_string()));
        assert_eq!(get("flag"), Some("true".to_string()));
        assert_eq!(get("absent"), None);
    }

    #[test]
    fn test_json_extractors() {
        let v = json!({
            "a": "hello",
            "b": 123,
            "c": "456",
            "d": 1.5,
            "e": [1]
        });

        assert_eq!(json_string(&v, "a").unwrap(), "hello");
        assert_eq!(json_f64(&v, "b").unwrap(), 123.0);
        assert_eq!(json_f64(&v, "c").unwrap(), 456.0);
        assert!((json_f64(&v, "d").unwrap() - 1.5).abs() < 1e-9);
        assert!(json_f64(&v, "e").is_err());
        assert!(json_string(&v, "b").is_err());
        assert!(json_get(&v, "missing").is_err());
    }
}
