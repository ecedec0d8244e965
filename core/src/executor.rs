use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::BuildError;
use crate::logger::{LogLevel, Logger};
use crate::policy::{ReturnCode, ReturnCodePolicy};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a process gets to exit after SIGTERM before it is killed. Also
/// bounds how long leftover output is drained after a timeout.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(500);

pub type Hook = Box<dyn FnOnce() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: Vec<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub return_code: ReturnCode,
    pub duration: f64,
    pub timed_out: bool,
    pub killed: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.return_code != ReturnCode::Fail
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn status_description(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => code.to_string(),
            (None, Some(signal)) => format!("signal {} ({})", signal, signal_name(signal)),
            (None, None) => "unknown".to_string(),
        }
    }

    fn report(&self) -> String {
        format!(
            "Process '{}' exited with status '{}', stdout:'{}', stderr: '{}'",
            self.command.join(" "),
            self.status_description(),
            self.stdout_lossy(),
            self.stderr_lossy()
        )
    }
}

/// One invocation of an external tool: `[program, *args, filename]`.
///
/// A unit is configured once and consumed by [`CompilationUnit::invoke`];
/// a second pass of the same tool is a freshly built unit.
pub struct CompilationUnit {
    program: String,
    args: Vec<String>,
    filename: String,
    cwd: Option<PathBuf>,
    timeout: Duration,
    pre_hook: Option<Hook>,
    post_hook: Option<Hook>,
    logger: Logger,
    policy: ReturnCodePolicy,
}

impl CompilationUnit {
    pub fn new(program: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            filename: filename.into(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
            pre_hook: None,
            post_hook: None,
            logger: Logger::null(),
            policy: ReturnCodePolicy::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pre_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.pre_hook = Some(Box::new(hook));
        self
    }

    pub fn with_post_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.post_hook = Some(Box::new(hook));
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_policy(mut self, policy: ReturnCodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> &ReturnCodePolicy {
        &self.policy
    }

    pub fn command(&self) -> Vec<String> {
        let mut command = Vec::with_capacity(self.args.len() + 2);
        command.push(self.program.clone());
        command.extend(self.args.iter().cloned());
        command.push(self.filename.clone());
        command
    }

    pub fn is_invocable(&self) -> bool {
        !self.program.trim().is_empty()
    }

    pub async fn invoke(mut self) -> Result<ExecutionResult, BuildError> {
        if let Some(hook) = self.pre_hook.take() {
            hook();
        }

        let result = self.run_process().await?;
        self.deal_return_code(&result)?;

        if let Some(hook) = self.post_hook.take() {
            hook();
        }

        Ok(result)
    }

    async fn run_process(&self) -> Result<ExecutionResult, BuildError> {
        let start = Instant::now();
        let command = self.command();

        let mut cmd = Command::new(&self.program);
        cmd.args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| BuildError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = OutputCapture::spawn(child.stdout.take());
        let stderr = OutputCapture::spawn(child.stderr.take());

        let (status, mut timed_out, killed) =
            match tokio::time::timeout(self.timeout, child.wait()).await {
                Ok(status) => (status.map_err(|e| self.wait_error(e))?, false, false),
                Err(_) => {
                    let (status, killed) = self.deal_timeout(&mut child).await?;
                    (status, true, killed)
                }
            };

        // Descendants of the tool may hold the pipes open after it exits.
        let drain_limit = if timed_out {
            TERMINATE_GRACE
        } else {
            self.timeout
                .saturating_sub(start.elapsed())
                .max(TERMINATE_GRACE)
        };
        let deadline = tokio::time::Instant::now() + drain_limit;
        let (stdout, stdout_closed) = stdout.finish(deadline).await;
        let (stderr, stderr_closed) = stderr.finish(deadline).await;

        if !(stdout_closed && stderr_closed) && !timed_out {
            self.logger.warn("Timeout expired");
            timed_out = true;
        }

        let exit_code = status.code();
        Ok(ExecutionResult {
            command,
            stdout,
            stderr,
            exit_code,
            signal: exit_signal(&status),
            return_code: self.policy.classify_status(exit_code),
            duration: start.elapsed().as_secs_f64(),
            timed_out,
            killed,
        })
    }

    async fn deal_timeout(&self, child: &mut Child) -> Result<(ExitStatus, bool), BuildError> {
        self.logger.warn("Timeout expired");
        terminate(child);

        if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            return Ok((status.map_err(|e| self.wait_error(e))?, false));
        }

        self.logger.warn("Process will not terminate, killing it");
        if let Err(err) = child.start_kill() {
            self.logger.log(
                LogLevel::Debug,
                &format!("kill of '{}' failed: {}", self.program, err),
            );
        }
        let status = child.wait().await.map_err(|e| self.wait_error(e))?;

        Ok((status, true))
    }

    fn deal_return_code(&self, result: &ExecutionResult) -> Result<(), BuildError> {
        match result.return_code {
            ReturnCode::Ok => Ok(()),
            ReturnCode::Warn => {
                self.logger.warn(&result.report());
                Ok(())
            }
            ReturnCode::Fail => Err(BuildError::ProcessFailure(result.report())),
        }
    }

    fn wait_error(&self, source: std::io::Error) -> BuildError {
        BuildError::io(format!("failed to wait for '{}'", self.program), source)
    }
}

impl fmt::Debug for CompilationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationUnit")
            .field("command", &self.command())
            .field("cwd", &self.cwd)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => append(&sink, &chunk[..n]),
                }
            }
        });

        Self { buffer, task }
    }

    /// Waits for the pipe to close, but not past `deadline`. Returns whatever
    /// was read so far and whether the pipe closed in time.
    async fn finish(mut self, deadline: tokio::time::Instant) -> (Vec<u8>, bool) {
        let closed = tokio::time::timeout_at(deadline, &mut self.task)
            .await
            .is_ok();
        if !closed {
            self.task.abort();
        }

        let captured = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        (captured, closed)
    }
}

fn append(sink: &Mutex<Vec<u8>>, bytes: &[u8]) {
    match sink.lock() {
        Ok(mut buf) => buf.extend_from_slice(bytes),
        Err(poisoned) => poisoned.into_inner().extend_from_slice(bytes),
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn signal_name(signal: i32) -> &'static str {
    match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        6 => "SIGABRT",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        15 => "SIGTERM",
        _ => "unknown signal",
    }
}
