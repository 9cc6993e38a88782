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

// Standardized command execution for collectors.
//
// Goals:
// - Centralize timeout behavior
// - Normalize stdout/stderr handling (UTF-8 lossy conversion)
// - Map spawn failures onto the collector error taxonomy
// - Provide an optional status check

use std::fmt;
use std::io;
use std::time::Duration;

use tracing::debug;

use crate::common::config::AppConfig;
use crate::error::{Error, Result};
use crate::runner::timeout::run_command_with_timeout;
use crate::traits::runner::CommandRunner;

/// One external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added to (or replacing entries in) the inherited environment.
    pub env: Vec<(String, String)>,
    /// Per-call timeout. If None, the runner default applies.
    pub timeout: Option<Duration>,
    /// If true, non-zero exit statuses will return an error.
    pub check_status: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn check_status(mut self) -> Self {
        self.check_status = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Normalized command output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code (or -1 if killed by a signal)
    pub status: i32,
    /// UTF-8 (lossy) decoded stdout
    pub stdout: String,
    /// UTF-8 (lossy) decoded stderr
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Execute a command described by `spec`.
///
/// - Uses `spec.timeout`, falling back to `default_timeout`
/// - A binary that cannot be found maps to `Error::ToolNotInstalled`
/// - A deadline overrun maps to `Error::Timeout`
/// - When `spec.check_status` is true and exit code != 0, returns `Error::CommandFailed`
pub fn execute_command(spec: &CommandSpec, default_timeout: Duration) -> Result<CommandOutput> {
    let timeout = spec.timeout.unwrap_or(default_timeout);
    debug!(command = %spec, ?timeout, "executing");

    let output = run_command_with_timeout(&spec.program, &spec.args, &spec.env, timeout)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ToolNotInstalled(spec.program.clone()),
            io::ErrorKind::TimedOut => Error::Timeout {
                command: spec.to_string(),
                after: timeout,
            },
            io::ErrorKind::PermissionDenied => {
                Error::PermissionDenied(format!("cannot execute {}", spec.program))
            }
            _ => Error::Io(e),
        })?;

    let out = CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    check_status(spec, out)
}

/// Apply the `check_status` contract of `spec` to an already captured output.
pub fn check_status(spec: &CommandSpec, out: CommandOutput) -> Result<CommandOutput> {
    if spec.check_status && !out.success() {
        return Err(Error::CommandFailed {
            command: spec.to_string(),
            code: Some(out.status),
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(out)
}

/// Runner that spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    default_timeout: Duration,
}

impl SystemRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(AppConfig::DEFAULT_COMMAND_TIMEOUT_SECS))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        execute_command(spec, self.default_timeout)
    }
}
