//! Launch external programs and relay their merged stdout/stderr.

pub mod check;
pub mod identity;
pub mod sink;

pub use check::{Require, SuccessCheck};
pub use sink::{Echo, LineSink, NullSink, TeeSink};

use crate::error::{Error, Result};
use std::{
    io::{self, BufRead, BufReader, Write},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::PathBuf,
    process::{Command, Stdio},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

/// One external command, described as data.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
    /// OS account the command must run as.
    pub user: Option<String>,
}

impl Invocation {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn envs(mut self, vars: Vec<(String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub const fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    #[must_use]
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Program followed by its arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Short name used in messages and metrics.
    #[must_use]
    pub fn tool(&self) -> &str {
        self.program
            .rsplit('/')
            .next()
            .unwrap_or(self.program.as_str())
    }
}

/// Exit code and the complete merged output of a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub exit_code: i32,
    pub output: String,
}

impl Captured {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `n` lines of output.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<String> {
        tail_lines(&self.output, n)
    }
}

#[must_use]
pub fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines
        .get(start..)
        .unwrap_or_default()
        .iter()
        .map(|line| (*line).to_string())
        .collect()
}

/// Seam between domain operations and the operating system.
pub trait Executor: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or times out
    fn capture(&self, invocation: &Invocation) -> Result<Captured>;

    /// # Errors
    ///
    /// Returns an error if the program cannot be started or times out
    fn stream(&self, invocation: &Invocation, sink: &mut dyn LineSink) -> Result<Captured>;

    /// # Errors
    ///
    /// Returns an error if the program cannot be started
    fn interactive(&self, invocation: &Invocation) -> Result<i32>;
}

/// Runs commands on this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn capture(&self, invocation: &Invocation) -> Result<Captured> {
        run_captured(invocation)
    }

    fn stream(&self, invocation: &Invocation, sink: &mut dyn LineSink) -> Result<Captured> {
        run_streamed(invocation, sink)
    }

    fn interactive(&self, invocation: &Invocation) -> Result<i32> {
        run_interactive(invocation)
    }
}

/// Run to completion and return everything the child printed.
///
/// # Errors
///
/// Returns `BinaryNotFound` if the program does not exist and `Timeout`
/// when the invocation's time limit expires. A non-zero exit is not an error.
pub fn run_captured(invocation: &Invocation) -> Result<Captured> {
    run_streamed(invocation, &mut NullSink)
}

/// Run to completion, forwarding each output line to `sink` as it arrives.
///
/// # Errors
///
/// Same as [`run_captured`], plus any error raised by the sink.
pub fn run_streamed(invocation: &Invocation, sink: &mut dyn LineSink) -> Result<Captured> {
    let (reader, writer) = io::pipe()?;
    let mut command = build_command(invocation)?;
    command
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(writer.try_clone()?)
        .stderr(writer);

    // A group of its own lets the watchdog take down grandchildren too.
    if invocation.timeout.is_some() {
        command.process_group(0);
    }

    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| spawn_error(e, &invocation.program))?;
    // Release the parent's write ends, otherwise EOF never arrives.
    drop(command);

    debug!(program = %invocation.tool(), pid = child.id(), user = ?invocation.user, "spawned");

    if let (Some(input), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
        thread::spawn(move || {
            // The child may exit before reading everything; that is its call.
            let _ = stdin.write_all(input.as_bytes());
        });
    }

    let watchdog = invocation
        .timeout
        .map(|limit| Watchdog::arm(child.id(), limit));

    let mut reader = BufReader::new(reader);
    let mut output = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        sink.line(line)?;
        output.push_str(line);
        output.push('\n');
    }

    let status = child.wait()?;
    let timed_out = watchdog.is_some_and(Watchdog::disarm);

    if timed_out {
        return Err(Error::Timeout {
            tool: invocation.tool().to_string(),
            after: invocation.timeout.unwrap_or_default(),
        });
    }

    let exit_code = status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0));

    debug!(
        program = %invocation.tool(),
        exit_code,
        elapsed_ms = started.elapsed().as_millis(),
        "finished"
    );

    Ok(Captured { exit_code, output })
}

/// Run attached to the caller's terminal.
///
/// # Errors
///
/// Returns `BinaryNotFound` if the program does not exist
pub fn run_interactive(invocation: &Invocation) -> Result<i32> {
    let mut command = build_command(invocation)?;
    let status = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_error(e, &invocation.program))?;

    Ok(status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)))
}

fn build_command(invocation: &Invocation) -> Result<Command> {
    let (argv, wrapped) = identity::effective_argv(invocation, identity::is_root());
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Precondition("empty command line".to_string()))?;

    let mut command = Command::new(program);
    command.args(args);

    if !wrapped {
        command.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
    }

    Ok(command)
}

fn spawn_error(err: io::Error, program: &str) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::BinaryNotFound {
            program: program.to_string(),
        }
    } else {
        Error::Io(err)
    }
}

/// Kills a child's process group once its time limit passes.
struct Watchdog {
    done: mpsc::Sender<()>,
    handle: thread::JoinHandle<bool>,
}

impl Watchdog {
    fn arm(pid: u32, limit: Duration) -> Self {
        let (done, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if rx.recv_timeout(limit) == Err(mpsc::RecvTimeoutError::Timeout) {
                if let Ok(pgid) = i32::try_from(pid) {
                    // SAFETY: kill(2) takes no pointers. The child was spawned with
                    // process_group(0), so -pgid names only its group; once the group
                    // is gone the call fails with ESRCH and does nothing.
                    unsafe {
                        libc::kill(-pgid, libc::SIGKILL);
                    }
                }
                return true;
            }
            false
        });
        Self { done, handle }
    }

    /// Stop watching; true when the limit had already expired.
    fn disarm(self) -> bool {
        let _ = self.done.send(());
        self.handle.join().unwrap_or(false)
    }
}
