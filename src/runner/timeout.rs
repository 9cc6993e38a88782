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

use std::io::{self, Read};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::common::config::AppConfig;

enum Pipe {
    Stdout,
    Stderr,
}

/// Execute a command with a timeout.
///
/// The child runs in its own process group. stdout and stderr are drained on
/// helper threads so a chatty child cannot block on a full pipe while we wait
/// for it. The deadline covers both the child's exit and the end of its
/// output: a backgrounded grandchild that keeps a pipe open past the deadline
/// is killed along with the rest of the group. On timeout an
/// `ErrorKind::TimedOut` error is returned.
pub fn run_command_with_timeout(
    command: &str,
    args: &[String],
    env: &[(String, String)],
    timeout: Duration,
) -> io::Result<Output> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn()?;
    let deadline = Instant::now() + timeout;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            let _ = tx.send((Pipe::Stdout, drain(stdout)));
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            let _ = tx.send((Pipe::Stderr, drain(stderr)));
        });
    }
    drop(tx);

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            terminate(&mut child);
            return Err(timed_out(timeout));
        }
        thread::sleep(Duration::from_millis(AppConfig::COMMAND_POLL_INTERVAL_MS));
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Pipe::Stdout, buf)) => stdout = buf,
            Ok((Pipe::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                kill_group(&child);
                return Err(timed_out(timeout));
            }
        }
    }

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn timed_out(timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("Command timed out after {timeout:?}"),
    )
}

fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    // process_group(0) made the child the leader of its own group
    let pgid = child.id() as libc::pid_t;
    unsafe {
        let _ = libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn drain<R: Read>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}
