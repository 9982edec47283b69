//! External process execution with per-step time limits and cancellation.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vcpkg_prebuild_core::{Environment, Error, Result};

/// Bounds applied to every eager step.
#[derive(Debug, Clone)]
pub struct StepLimits {
    /// Longest a single step may run
    pub timeout: Duration,
    /// Cancels the running step when triggered
    pub cancel: CancellationToken,
}

impl StepLimits {
    /// Limits with `timeout` and a fresh cancellation token.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` instead of the private token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Output of a process whose streams were captured.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Run `program` with stdout and stderr appended to a fresh `log` file.
///
/// `environment` replaces the inherited environment when given.
///
/// # Errors
///
/// Returns an I/O error if the log cannot be created or the program cannot
/// be started, [`Error::Timeout`] or [`Error::Cancelled`] if the limits hit.
/// A non-zero exit is reported through the returned status.
pub async fn run_logged(
    label: &str,
    program: &Path,
    args: &[String],
    environment: Option<&Environment>,
    log: &Path,
    limits: &StepLimits,
) -> Result<ExitStatus> {
    let log_file = std::fs::File::create(log)
        .map_err(|e| Error::io(e, Some(log.to_path_buf()), "create log file"))?;
    let stderr_file = log_file
        .try_clone()
        .map_err(|e| Error::io(e, Some(log.to_path_buf()), "clone log file"))?;

    let mut cmd = command(program, args, environment);
    cmd.stdout(Stdio::from(log_file)).stderr(Stdio::from(stderr_file));

    debug!(%label, program = %program.display(), ?args, log = %log.display(), "Running step");
    let mut child = spawn(label, program, &mut cmd)?;
    wait(label, &mut child, limits).await
}

/// Run `program` capturing stdout and stderr.
///
/// # Errors
///
/// Same as [`run_logged`].
pub async fn run_captured(
    label: &str,
    program: &Path,
    args: &[String],
    environment: Option<&Environment>,
    limits: &StepLimits,
) -> Result<CapturedOutput> {
    let mut cmd = command(program, args, environment);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!(%label, program = %program.display(), ?args, "Running step");
    let mut child = spawn(label, program, &mut cmd)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr {
            let _ = err.read_to_end(&mut buf).await;
        }
        buf
    });

    let status = wait(label, &mut child, limits).await?;
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CapturedOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn command(program: &Path, args: &[String], environment: Option<&Environment>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
    if let Some(env) = environment {
        cmd.env_clear().envs(env);
    }
    cmd
}

fn spawn(label: &str, program: &Path, cmd: &mut Command) -> Result<Child> {
    cmd.spawn().map_err(|e| {
        Error::process_failed(
            label,
            format!("failed to start {}: {e}", program.display()),
        )
    })
}

async fn wait(label: &str, child: &mut Child, limits: &StepLimits) -> Result<ExitStatus> {
    let status = tokio::select! {
        status = child.wait() => status,
        () = tokio::time::sleep(limits.timeout) => {
            warn!(%label, seconds = limits.timeout.as_secs(), "Step timed out");
            let _ = child.kill().await;
            return Err(Error::timeout(label, limits.timeout.as_secs()));
        }
        () = limits.cancel.cancelled() => {
            warn!(%label, "Step cancelled");
            let _ = child.kill().await;
            return Err(Error::cancelled(label));
        }
    };
    status.map_err(|e| Error::process_failed(label, format!("failed to wait for process: {e}")))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh() -> &'static Path {
        Path::new("/bin/sh")
    }

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    #[tokio::test]
    async fn test_run_logged_writes_both_streams() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("extract.log");
        let limits = StepLimits::new(Duration::from_secs(10));

        let status = run_logged("echo", sh(), &script("echo out; echo err >&2"), None, &log, &limits)
            .await
            .unwrap();

        assert!(status.success());
        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_status() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("download.log");
        let limits = StepLimits::new(Duration::from_secs(10));

        let status = run_logged("fail", sh(), &script("exit 22"), None, &log, &limits)
            .await
            .unwrap();
        assert_eq!(status.code(), Some(22));
    }

    #[tokio::test]
    async fn test_timeout_kills_step() {
        let limits = StepLimits::new(Duration::from_millis(100));
        let result = run_captured("sleep", sh(), &script("sleep 5"), None, &limits).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let limits = StepLimits::new(Duration::from_secs(30));
        let token = limits.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let result = run_captured("sleep", sh(), &script("sleep 5"), None, &limits).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_environment_is_replaced() {
        let mut env = Environment::new();
        env.insert("ONLY_THIS".into(), "1".into());
        let limits = StepLimits::new(Duration::from_secs(10));

        let output = run_captured(
            "env",
            sh(),
            &script("echo \"${ONLY_THIS}:${HOME:-unset}\""),
            Some(&env),
            &limits,
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.trim(), "1:unset");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let limits = StepLimits::new(Duration::from_secs(10));
        let result = run_captured(
            "missing",
            Path::new("/nonexistent/bin/tool"),
            &[],
            None,
            &limits,
        )
        .await;
        assert!(matches!(result, Err(Error::ProcessFailed { .. })));
    }
}
