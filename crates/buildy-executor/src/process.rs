//! Running one external command with combined output capture and a deadline.

use buildy_core::Command;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command as Process};
use tokio::time::timeout;
use tracing::{debug, warn};

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed { exit_code: Option<i32> },
    /// Killed after running past its deadline.
    TimedOut,
    /// The program could not be started at all.
    SpawnFailed,
}

/// Status plus everything the step wrote to stdout and stderr, interleaved in
/// the order it was read.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub status: StepStatus,
    pub output: Vec<u8>,
}

impl StepOutput {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// Run `command` inside `dir`, killing it if it outlives `deadline`.
///
/// Never fails: spawn errors, read errors and timeouts are all reported
/// through [`StepStatus`], with a short explanation appended to the output.
pub async fn run_step(command: &Command, dir: &Path, deadline: Duration) -> StepOutput {
    debug!(command = %command, dir = %dir.display(), "Running step");

    let spawned = Process::new(&command.program)
        .args(&command.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            warn!(command = %command, error = %e, "Failed to start step");
            return StepOutput {
                status: StepStatus::SpawnFailed,
                output: format!("failed to start '{}': {}\n", command, e).into_bytes(),
            };
        }
    };

    let mut output = Vec::new();
    let waited = timeout(deadline, capture_combined(&mut child, &mut output)).await;

    let status = match waited {
        Ok(Ok(status)) if status.success() => StepStatus::Succeeded,
        Ok(Ok(status)) => StepStatus::Failed {
            exit_code: status.code(),
        },
        Ok(Err(e)) => {
            let _ = child.kill().await;
            output.extend_from_slice(
                format!("error reading output of '{}': {}\n", command, e).as_bytes(),
            );
            StepStatus::Failed { exit_code: None }
        }
        Err(_) => {
            warn!(command = %command, secs = deadline.as_secs(), "Step timed out, killing it");
            let _ = child.kill().await;
            output.extend_from_slice(
                format!("'{}' timed out after {}s\n", command, deadline.as_secs_f32()).as_bytes(),
            );
            StepStatus::TimedOut
        }
    };

    StepOutput { status, output }
}

/// Drain stdout and stderr into one buffer until both close, then reap.
async fn capture_combined(child: &mut Child, output: &mut Vec<u8>) -> io::Result<ExitStatus> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];

    loop {
        tokio::select! {
            n = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => match n? {
                0 => stdout = None,
                n => output.extend_from_slice(&out_buf[..n]),
            },
            n = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => match n? {
                0 => stderr = None,
                n => output.extend_from_slice(&err_buf[..n]),
            },
            else => break,
        }
    }

    child.wait().await
}

async fn read_some<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => Ok(0),
    }
}
