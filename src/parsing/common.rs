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

// Common parsing utilities for number extraction and tokenizing.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("valid number regex")
});

/// Parse a number from a string after sanitizing by removing commas, underscores, and trimming.
/// Returns None if parsing fails.
pub fn parse_number<T: FromStr>(s: &str) -> Option<T> {
    let cleaned = s.trim().replace([',', '_'], "");
    cleaned.parse::<T>().ok()
}

/// Parse a value that must be a number as written: int, float or scientific
/// notation. Words that `f64::from_str` happens to accept (`inf`, `NaN`) are
/// rejected.
pub fn parse_strict_f64(s: &str) -> Option<f64> {
    let s = s.trim();
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Extract the leading numeric token of a string, ignoring whatever follows.
/// `"  42 % free"` yields `42.0`, `"36 (Min/Max 24/40)"` yields `36.0`.
pub fn leading_number(s: &str) -> Option<f64> {
    LEADING_NUMBER
        .find(s.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Split a line into tokens the way a POSIX shell splits words, minus
/// expansion.
///
/// - Unquoted whitespace separates tokens.
/// - `'...'` is taken literally.
/// - `"..."` keeps spaces; inside it `\` escapes only `"`, `\`, `$` and `` ` ``.
/// - An unquoted `\` escapes the next character.
/// - A `#` at the start of a token comments out the rest of the line.
///
/// Quotes may be adjacent to other text (`-d"megaraid,0"`), and `""` yields
/// an empty token. An unterminated quote runs to the end of the line.
pub fn split_command_line(line: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Plain,
        Single,
        Double,
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut state = State::Plain;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (state, c) {
            (State::Single, '\'') | (State::Double, '"') => state = State::Plain,
            (State::Single, c) => current.push(c),
            (State::Double, '\\') => match chars.peek() {
                Some(&next @ ('"' | '\\' | '$' | '`')) => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push('\\'),
            },
            (State::Double, c) => current.push(c),
            (State::Plain, '\'') => {
                state = State::Single;
                in_token = true;
            }
            (State::Plain, '"') => {
                state = State::Double;
                in_token = true;
            }
            (State::Plain, '\\') => {
                current.push(chars.next().unwrap_or('\\'));
                in_token = true;
            }
            (State::Plain, '#') if !in_token => break,
            (State::Plain, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (State::Plain, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}
