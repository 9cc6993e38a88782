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

//! The system runner against throwaway tool scripts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use textfile_collectors::runner::{CommandSpec, SystemRunner};
use textfile_collectors::traits::CommandRunner;
use textfile_collectors::Error;

fn fake_tool(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn spec(path: &Path) -> CommandSpec {
    CommandSpec::new(path.to_string_lossy().to_string())
}

#[test]
fn test_captures_stdout_and_status() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "zypper", "echo 'zypper 1.14.68'\nexit 100");

    let out = SystemRunner::default().run(&spec(&tool).arg("-V")).unwrap();
    assert_eq!(out.status, 100);
    assert_eq!(out.stdout, "zypper 1.14.68\n");
}

#[test]
fn test_status_check_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "ssacli", "echo 'Error: no controllers' >&2\nexit 1");

    let err = SystemRunner::default()
        .run(&spec(&tool).args(["ctrl", "all", "show"]).check_status())
        .unwrap_err();
    match err {
        Error::CommandFailed { code, stderr, .. } => {
            assert_eq!(code, Some(1));
            assert_eq!(stderr, "Error: no controllers");
        }
        other => panic!("Expected CommandFailed, got {other:?}"),
    }
}

#[test]
fn test_environment_override() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "nvme", "printf '%s' \"$LC_ALL\"");

    let out = SystemRunner::default()
        .run(&spec(&tool).arg("version").env("LC_ALL", "C"))
        .unwrap();
    assert_eq!(out.stdout, "C");
}

#[test]
fn test_hung_tool_times_out() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(&dir, "smartctl", "sleep 10");

    let err = SystemRunner::new(Duration::from_secs(30))
        .run(&spec(&tool).timeout(Duration::from_millis(200)))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { after, .. } if after == Duration::from_millis(200)));
}

#[test]
fn test_backgrounded_helper_cannot_outlive_timeout() {
    let dir = TempDir::new().unwrap();
    // exits at once, leaving a child that still holds stdout
    let tool = fake_tool(&dir, "zpool", "sleep 6 &\necho done");

    let started = Instant::now();
    let err = SystemRunner::default()
        .run(&spec(&tool).timeout(Duration::from_secs(1)))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { after, .. } if after == Duration::from_secs(1)));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_missing_tool() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("wg");

    let err = SystemRunner::default().run(&spec(&missing)).unwrap_err();
    assert!(matches!(err, Error::ToolNotInstalled(_)));
}

#[test]
fn test_non_executable_tool() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chronyc");
    fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    let err = SystemRunner::default().run(&spec(&path)).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}
