use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Captured result of a finished child process
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl SubprocessResult {
    /// Check if the process exited with status zero
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Spawn a command with all three standard streams piped
///
/// The child is killed if its handle is dropped before it exits. On Unix it
/// also leads its own process group, so a timeout can take down anything it
/// forked.
pub fn spawn_piped(cmd: &mut Command) -> Result<Child> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(OrchestratorError::ProcessSpawnError)
}

/// Write `input` to the child's stdin, close it, and collect its output
///
/// With a timeout, the whole exchange is bounded and the child's process
/// group is killed once the deadline passes.
pub async fn communicate(
    child: Child,
    input: &str,
    timeout: Option<Duration>,
) -> Result<SubprocessResult> {
    let pid = child.id();
    let exchange = exchange(child, input);
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                Err(OrchestratorError::ProcessTimeout(limit))
            }
        },
        None => exchange.await,
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    // SAFETY: kill(2) only sends a signal; a negative pid targets the group
    let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
    if rc == -1 {
        debug!(
            "failed to kill process group {}: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

async fn exchange(mut child: Child, input: &str) -> Result<SubprocessResult> {
    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(input.as_bytes()).await {
            Ok(()) => stdin.flush().await.or_else(ignore_broken_pipe)?,
            Err(e) => ignore_broken_pipe(e)?,
        }
        // Drop stdin to close it and signal EOF
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(OrchestratorError::ProcessIoError)?;

    Ok(SubprocessResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// A child that exits without reading its input is not an I/O failure
fn ignore_broken_pipe(e: std::io::Error) -> Result<()> {
    if e.kind() == ErrorKind::BrokenPipe {
        debug!("child closed stdin before reading all input");
        Ok(())
    } else {
        Err(OrchestratorError::ProcessIoError(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_communicate_feeds_stdin_and_captures_streams() {
        let child = spawn_piped(&mut sh("read line; echo \"got $line\"; echo oops >&2")).unwrap();
        let result = communicate(child, "hello\nexit\n", None).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout.trim(), "got hello");
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_communicate_reports_non_zero_exit() {
        let child = spawn_piped(&mut sh("exit 3")).unwrap();
        let result = communicate(child, "", None).await.unwrap();

        assert!(!result.success());
        assert_eq!(result.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_communicate_times_out() {
        let child = spawn_piped(&mut sh("sleep 30")).unwrap();
        let started = Instant::now();
        let result = communicate(child, "", Some(Duration::from_millis(200))).await;

        assert!(matches!(result, Err(OrchestratorError::ProcessTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    fn is_gone(pid: &str) -> bool {
        // A zombie awaiting reaping counts as gone
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(|rest| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let child = spawn_piped(&mut sh(&script)).unwrap();
        let result = communicate(child, "", Some(Duration::from_millis(300))).await;
        assert!(matches!(result, Err(OrchestratorError::ProcessTimeout(_))));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_gone(pid) {
            assert!(Instant::now() < deadline, "grandchild {} still running", pid);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let result = spawn_piped(&mut Command::new("/definitely/not/a/program"));
        assert!(matches!(result, Err(OrchestratorError::ProcessSpawnError(_))));
    }
}
