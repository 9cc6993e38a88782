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

//! Delimiter-driven line parsing.
//!
//! Turns the raw text of one command invocation into a lazy stream of
//! [`RawRecord`]s (`key<sep>value` lines) or tabular rows.

/// One `key<sep>value` pair extracted from a line of command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    pub value: String,
}

impl RawRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Field separator of a line oriented output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Colon,
    Pipe,
    Comma,
    Tab,
    Whitespace,
}

impl Separator {
    fn as_char(self) -> Option<char> {
        match self {
            Separator::Colon => Some(':'),
            Separator::Pipe => Some('|'),
            Separator::Comma => Some(','),
            Separator::Tab => Some('\t'),
            Separator::Whitespace => None,
        }
    }

    fn split_once(self, line: &str) -> Option<(&str, &str)> {
        match self.as_char() {
            Some(sep) => line.split_once(sep),
            None => line.trim_start().split_once(char::is_whitespace),
        }
    }

    fn split(self, line: &str) -> Vec<&str> {
        match self.as_char() {
            Some(sep) => line.split(sep).collect(),
            None => line.split_whitespace().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineParser {
    separator: Separator,
    required: Option<String>,
    skip_lines: usize,
}

impl LineParser {
    pub fn new(separator: Separator) -> Self {
        Self {
            separator,
            required: None,
            skip_lines: 0,
        }
    }

    /// Only consider lines containing `needle`.
    pub fn require(mut self, needle: impl Into<String>) -> Self {
        self.required = Some(needle.into());
        self
    }

    /// Ignore the first `lines` lines (banners, table headers).
    pub fn skip(mut self, lines: usize) -> Self {
        self.skip_lines = lines;
        self
    }

    fn lines<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        text.lines()
            .skip(self.skip_lines)
            .filter(move |line| match &self.required {
                Some(needle) => line.contains(needle.as_str()),
                None => true,
            })
    }

    /// Lazily yield every `key<sep>value` line as a record.
    ///
    /// Key and value are trimmed at both ends; inner whitespace of the value
    /// is preserved and an empty value still produces a record. Lines with
    /// no separator or an empty key are skipped.
    pub fn records<'a>(&'a self, text: &'a str) -> impl Iterator<Item = RawRecord> + 'a {
        self.lines(text).filter_map(move |line| {
            let (key, value) = self.separator.split_once(line)?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some(RawRecord::new(key, value.trim()))
        })
    }

    /// Lazily yield every non-blank line split into trimmed fields.
    pub fn rows<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Vec<String>> + 'a {
        self.lines(text)
            .filter(|line| !line.trim().is_empty())
            .map(move |line| {
                self.separator
                    .split(line)
                    .into_iter()
                    .map(|field| field.trim().to_string())
                    .collect()
            })
    }
}
