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

//! Canned command output keyed by command line.
//!
//! Lets collectors be driven from captured tool output instead of real
//! hardware. Every lookup is recorded so callers can assert which commands
//! a collector actually issued.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::runner::command::{check_status, CommandOutput, CommandSpec};
use crate::traits::runner::CommandRunner;

#[derive(Debug, Default)]
pub struct FixtureRunner {
    responses: HashMap<String, CommandOutput>,
    missing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FixtureRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `command` with `stdout` and exit status 0.
    pub fn with_output(self, command: &str, stdout: &str) -> Self {
        self.with_status(command, 0, stdout)
    }

    /// Respond to `command` with `stdout` and the given exit status.
    pub fn with_status(mut self, command: &str, status: i32, stdout: &str) -> Self {
        self.responses.insert(
            command.to_string(),
            CommandOutput {
                status,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Pretend `program` is not installed.
    pub fn with_missing(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    /// Command lines issued so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for FixtureRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line.clone());
        }

        if self.missing.contains(&spec.program) {
            return Err(Error::ToolNotInstalled(spec.program.clone()));
        }

        let out = match self.responses.get(&line) {
            Some(out) => out.clone(),
            None => CommandOutput {
                status: 127,
                stdout: String::new(),
                stderr: format!("no fixture for '{line}'"),
            },
        };
        check_status(spec, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_command_returns_output() {
        let runner = FixtureRunner::new().with_output("wg show all dump", "wg0\tkey\n");
        let out = runner
            .run(&CommandSpec::new("wg").args(["show", "all", "dump"]))
            .unwrap();
        assert_eq!(out.stdout, "wg0\tkey\n");
        assert_eq!(runner.calls(), vec!["wg show all dump".to_string()]);
    }

    #[test]
    fn test_unknown_command_fails_status_check() {
        let runner = FixtureRunner::new();
        let err = runner
            .run(&CommandSpec::new("zypper").arg("lu").check_status())
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: Some(127), .. }));
    }

    #[test]
    fn test_missing_program() {
        let runner = FixtureRunner::new().with_missing("ssacli");
        let err = runner.run(&CommandSpec::new("ssacli")).unwrap_err();
        assert!(matches!(err, Error::ToolNotInstalled(_)));
    }
}
