//! External command execution with a hard deadline.
//!
//! Every call into the service manager goes through [`run_with_timeout`] so a
//! hung tool can never wedge the caller.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Failure to run an external command to completion.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started (missing binary, permissions).
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("failed to wait for {program}: {source}")]
    Wait {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The program did not exit before the deadline and was killed.
    #[error("{program} timed out after {}ms", timeout.as_millis())]
    TimedOut {
        /// Program name.
        program: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Runs `command` to completion, killing it if it outlives `timeout`.
///
/// Standard input is closed, standard output and error are captured on
/// background readers so a chatty child can never block on a full pipe.
///
/// # Errors
///
/// Returns [`CommandError::Spawn`] if the program cannot be started,
/// [`CommandError::TimedOut`] if the deadline passes, and
/// [`CommandError::Wait`] if the child cannot be waited on.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!(
        program = %program,
        args = ?command.get_args().collect::<Vec<_>>(),
        "running external command"
    );

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program = %program, ?timeout, "external command timed out");
                return Err(CommandError::TimedOut { program, timeout });
            }
            Ok(None) => std::thread::sleep(WAIT_POLL_INTERVAL),
            Err(source) => return Err(CommandError::Wait { program, source }),
        }
    };

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
