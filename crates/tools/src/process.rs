//! Supervised External Process Execution
//!
//! Runs an external tool with captured output, a timeout, and forced
//! termination. A timed-out process is killed and given a fixed grace period
//! to exit; the timeout is reported distinctly from a non-zero exit.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use fine_coverage_core::{CoreError, CoreResult};

/// Time allowed for a killed process to finish exiting.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a caller wants timeouts and failures surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return the error to the caller
    Strict,
    /// Log the error and report `false`
    BestEffort,
}

/// One process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl ProcessRequest {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            executable: executable.into(),
            args,
            working_directory: None,
            timeout_secs,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Command line for log messages.
    pub fn display(&self) -> String {
        let mut line = self.executable.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Exit code plus stdout and stderr merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `ToolExecutionFailed`.
    pub fn into_result(self) -> CoreResult<ProcessOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(CoreError::ToolExecutionFailed {
                exit_code: self.exit_code,
                output: self.output,
            })
        }
    }
}

/// Executes external commands.
///
/// `Ok` carries any exit code; timeouts, cancellation and spawn failures are
/// errors.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, request: &ProcessRequest, cancel: &CancellationToken) -> CoreResult<ProcessOutput>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace_period: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            grace_period: KILL_GRACE_PERIOD,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(request: &ProcessRequest) -> Command {
        let mut cmd = Command::new(&request.executable);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_directory {
            cmd.current_dir(dir);
        }
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, request: &ProcessRequest, cancel: &CancellationToken) -> CoreResult<ProcessOutput> {
        debug!("[Process] Running {}", request.display());
        let started = Instant::now();
        let deadline = started + Duration::from_secs(request.timeout_secs);

        let mut child = Self::command(request)
            .spawn()
            .map_err(|e| CoreError::command(format!("Failed to spawn {}: {}", request.executable.display(), e)))?;

        // Drain both pipes while waiting so a chatty tool cannot block on a full pipe.
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::new();
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, stderr.clone()));
        }

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| CoreError::command(format!("Failed to wait for {}: {}", request.executable.display(), e))),
            _ = tokio::time::sleep_until(deadline) => {
                self.terminate(&mut child, request).await;
                Err(CoreError::ToolExecutionTimeout {
                    elapsed_secs: started.elapsed().as_secs_f64(),
                    timeout_secs: request.timeout_secs,
                })
            }
            _ = cancel.cancelled() => {
                self.terminate(&mut child, request).await;
                Err(CoreError::cancelled(format!("{} was cancelled", request.executable.display())))
            }
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                abort_readers(&readers);
                return Err(e);
            }
        };

        // A descendant that inherited the pipes can hold them open after exit.
        let drained = tokio::select! {
            _ = join_readers(&mut readers) => true,
            _ = tokio::time::sleep_until(deadline) => false,
            _ = cancel.cancelled() => {
                abort_readers(&readers);
                return Err(CoreError::cancelled(format!("{} was cancelled", request.executable.display())));
            }
        };
        if !drained {
            warn!(
                "[Process] {} exited but its output pipes were still open after {} seconds",
                request.executable.display(),
                request.timeout_secs
            );
            abort_readers(&readers);
        }

        let mut output = String::from_utf8_lossy(&take_buffer(&stdout)).into_owned();
        let err = take_buffer(&stderr);
        if !err.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&String::from_utf8_lossy(&err));
        }

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            output,
        })
    }
}

fn spawn_reader<R>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    })
}

async fn join_readers(readers: &mut [JoinHandle<()>]) {
    for reader in readers.iter_mut() {
        let _ = reader.await;
    }
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

fn take_buffer(buffer: &Mutex<Vec<u8>>) -> Vec<u8> {
    buffer.lock().map(|mut buf| std::mem::take(&mut *buf)).unwrap_or_default()
}

impl ProcessRunner {
    /// Kill the child and wait up to the grace period for it to exit.
    async fn terminate(&self, child: &mut tokio::process::Child, request: &ProcessRequest) {
        if let Err(e) = child.start_kill() {
            warn!("[Process] Failed to kill {}: {}", request.executable.display(), e);
        }
        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(_)) => debug!("[Process] {} terminated", request.executable.display()),
            Ok(Err(e)) => warn!("[Process] Error waiting for {} to exit: {}", request.executable.display(), e),
            Err(_) => error!(
                "[Process] {} did not exit within {} seconds of being killed",
                request.executable.display(),
                self.grace_period.as_secs()
            ),
        }
    }
}
