// src/exec.rs

//! External build tool invocation
//!
//! Build steps are described as a [`CommandSpec`]: a program, a structured
//! argument list, a complete environment mapping and a working directory.
//! Nothing is interpreted by a shell. Specs are executed by a
//! [`CommandRunner`]; [`ProcessRunner`] is the default implementation.
//!
//! Every child runs in its own process group so that cancellation and step
//! timeouts can take down the whole tool tree (make spawning compilers,
//! cmake spawning make) with `SIGTERM`, followed by `SIGKILL` after a grace
//! period.

use crate::error::{Error, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Number of output lines carried by build failures
pub const OUTPUT_TAIL_LINES: usize = 20;

/// One external command: program, arguments, environment and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment of the child; the parent environment is not inherited
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: PathBuf::from("."),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = dir.into();
        self
    }

    /// Command line for logs; quoting is cosmetic only
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and captured output of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0) && !self.timed_out
    }

    /// Last `lines` lines of combined output, stdout first
    pub fn tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes command specs
///
/// Implementations must return `Error::Cancelled` when `cancel` fires while
/// the command is running. A non-zero exit is reported through
/// [`CommandOutput::status`], not as an error.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    poll_interval: Duration,
    grace_period: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill steps running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    fn terminate(&self, child: &mut Child) -> io::Result<ExitStatus> {
        let group = Pid::from_raw(child.id() as i32);
        if let Err(e) = killpg(group, Signal::SIGTERM) {
            debug!("SIGTERM to process group {} failed: {}", group, e);
        }
        if let Some(status) = child.wait_timeout(self.grace_period)? {
            return Ok(status);
        }

        warn!("Process group {} ignored SIGTERM, killing", group);
        let _ = killpg(group, Signal::SIGKILL);
        let _ = child.kill();
        child.wait()
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut child = match Command::new(&spec.program)
            .args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Ok(CommandOutput {
                    status: None,
                    stderr: format!("failed to spawn '{}': {}", spec.program, e),
                    ..Default::default()
                });
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let started = Instant::now();

        let mut timed_out = false;
        let mut cancelled = false;
        let status = loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break self.terminate(&mut child)?;
            }
            if let Some(status) = child.wait_timeout(self.poll_interval)? {
                break status;
            }
            if let Some(limit) = self.timeout
                && started.elapsed() > limit
            {
                warn!(
                    "'{}' exceeded {}s timeout, terminating",
                    spec.program,
                    limit.as_secs()
                );
                timed_out = true;
                break self.terminate(&mut child)?;
            }
        };

        let output = CommandOutput {
            status: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            timed_out,
        };

        if cancelled {
            return Err(Error::Cancelled);
        }
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Append-only log of the commands run for one pair and their output
#[derive(Debug)]
pub struct BuildLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl BuildLog {
    /// Create (truncating) the log file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self, text: &str) -> Result<()> {
        let mut file = self.file.lock();
        writeln!(file, "{}", text)?;
        Ok(())
    }

    pub fn command(&self, step: &str, spec: &CommandSpec) -> Result<()> {
        self.line(&format!("=== {} ===", step))?;
        self.line(&format!("cwd: {}", spec.cwd.display()))?;
        self.line(&format!("$ {}", spec.display()))
    }

    pub fn output(&self, output: &CommandOutput) -> Result<()> {
        let mut file = self.file.lock();
        if !output.stdout.is_empty() {
            file.write_all(output.stdout.as_bytes())?;
            if !output.stdout.ends_with('\n') {
                file.write_all(b"\n")?;
            }
        }
        if !output.stderr.is_empty() {
            file.write_all(output.stderr.as_bytes())?;
            if !output.stderr.ends_with('\n') {
                file.write_all(b"\n")?;
            }
        }
        match (output.status, output.timed_out) {
            (_, true) => writeln!(file, "--- timed out ---")?,
            (Some(code), false) => writeln!(file, "--- exit status {} ---", code)?,
            (None, false) => writeln!(file, "--- terminated ---")?,
        }
        Ok(())
    }
}
