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

//! Unified error types for the collectors.
//!
//! Every failure a collector run can end with is one variant of [`enum@Error`].
//! An empty command result is *not* an error: collectors render it as an
//! explicit zero-valued series instead.

use std::process::ExitCode;
use std::time::Duration;

use thiserror::Error;

/// The main error type for collector runs.
#[derive(Debug, Error)]
pub enum Error {
    /// The wrapped utility is not installed or not on `PATH`.
    #[error("{0} is not installed")]
    ToolNotInstalled(String),

    /// The collector needs privileges the current process does not have.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The wrapped utility exited with a non-zero status.
    #[error("Command failed: '{command}' (code: {code:?}) stderr: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The wrapped utility did not finish within its deadline and was killed.
    #[error("Command timed out after {after:?}: '{command}'")]
    Timeout { command: String, after: Duration },

    /// The utility produced output the collector cannot make sense of.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A metric or label name does not satisfy the exposition format rules.
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for collector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal outcome of one collector invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ToolNotInstalled,
    PermissionDenied,
    CommandFailed,
    ParseFailed,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Success => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }
}

impl From<&Error> for Outcome {
    fn from(err: &Error) -> Self {
        match err {
            Error::ToolNotInstalled(_) => Outcome::ToolNotInstalled,
            Error::PermissionDenied(_) => Outcome::PermissionDenied,
            Error::CommandFailed { .. } | Error::Timeout { .. } | Error::Io(_) => {
                Outcome::CommandFailed
            }
            Error::Parse(_) | Error::InvalidMetric(_) | Error::Json(_) => Outcome::ParseFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ToolNotInstalled("nvme".to_string());
        assert_eq!(err.to_string(), "nvme is not installed");

        let err = Error::PermissionDenied("nvme-metrics requires root".to_string());
        assert_eq!(err.to_string(), "Permission denied: nvme-metrics requires root");

        let err = Error::CommandFailed {
            command: "zypper --quiet lu".to_string(),
            code: Some(6),
            stderr: "no repositories".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command failed: 'zypper --quiet lu' (code: Some(6)) stderr: no repositories"
        );
    }

    #[test]
    fn test_outcome_mapping() {
        let err = Error::ToolNotInstalled("wg".to_string());
        assert_eq!(Outcome::from(&err), Outcome::ToolNotInstalled);

        let err = Error::Timeout {
            command: "smartctl --health /dev/sda".to_string(),
            after: Duration::from_secs(30),
        };
        assert_eq!(Outcome::from(&err), Outcome::CommandFailed);

        let err = Error::Parse("bad csv".to_string());
        assert_eq!(Outcome::from(&err), Outcome::ParseFailed);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
