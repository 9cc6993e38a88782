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

//! Precondition checks run before any collection work starts.

use tracing::debug;

use crate::error::{Error, Result};
use crate::runner::command::CommandSpec;
use crate::traits::runner::CommandRunner;

/// Whether the process runs with an effective uid of 0.
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    true
}

/// Fail fast with `PermissionDenied` unless running as root.
pub fn ensure_root(collector: &str) -> Result<()> {
    if is_root() {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "{collector} requires root privileges"
        )))
    }
}

/// Probe that the tool behind `spec` is installed.
///
/// Only a missing binary is fatal here. A probe that runs but exits non-zero
/// (many tools do when called without a subcommand) still proves the tool is
/// present.
pub fn ensure_tool(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<()> {
    match runner.run(spec) {
        Err(Error::ToolNotInstalled(program)) => Err(Error::ToolNotInstalled(program)),
        Err(e) => {
            debug!(command = %spec, error = %e, "tool probe failed, tool is present");
            Ok(())
        }
        Ok(_) => Ok(()),
    }
}
