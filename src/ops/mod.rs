//! Administrative operations, one module per area of the database.
//!
//! Every operation validates its input, then drives an Oracle tool through
//! the [`Executor`] held by the [`Context`].

pub mod asm;
pub mod database;
pub mod dataguard;
pub mod detect;
pub mod download;
pub mod flashback;
pub mod install;
pub mod labs;
pub mod nfs;
pub mod pdb;
pub mod precheck;
pub mod protection;
pub mod rac;
pub mod rman;
pub mod security;
pub mod smoke;
pub mod storage;
pub mod tuning;

use crate::{
    config::Config,
    error::Result,
    metrics,
    runner::{Captured, Echo, Executor, Invocation, SuccessCheck, TeeSink},
    sqlplus::SqlPlus,
};
use serde::Serialize;
use std::{sync::Arc, time::Instant};

/// Everything an operation needs: configuration, the process seam and
/// where streamed tool output should be echoed.
#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub exec: Arc<dyn Executor>,
    pub echo: Echo,
}

impl Context {
    #[must_use]
    pub fn new(config: Config, exec: Arc<dyn Executor>) -> Self {
        Self {
            config,
            exec,
            echo: Echo::Stdout,
        }
    }

    #[must_use]
    pub fn with_echo(mut self, echo: Echo) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub fn executor(&self) -> &dyn Executor {
        self.exec.as_ref()
    }

    /// A `/ as sysdba` session.
    #[must_use]
    pub fn sql(&self) -> SqlPlus<'_> {
        SqlPlus::new(self.exec.as_ref(), &self.config)
    }

    /// Binary under `$ORACLE_HOME/bin`, run as the Oracle OS user.
    #[must_use]
    pub fn oracle_tool(&self, name: &str) -> Invocation {
        Invocation::new(self.config.oracle_bin(name))
            .envs(self.config.oracle_env())
            .as_user(&self.config.oracle.os_user)
    }

    /// Any program run as the Oracle OS user with the Oracle environment.
    #[must_use]
    pub fn as_oracle(&self, program: &str) -> Invocation {
        Invocation::new(program)
            .envs(self.config.oracle_env())
            .as_user(&self.config.oracle.os_user)
    }

    /// Stream into `<log_dir>/<log_name>.log` and apply `check`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened, the tool cannot be
    /// started, or `check` rejects the result
    pub fn logged(
        &self,
        invocation: &Invocation,
        log_name: &str,
        check: SuccessCheck,
    ) -> Result<Captured> {
        let log = self.config.log_path(log_name);
        let mut sink = TeeSink::create(&log, &self.echo)?;
        let captured = self.exec.stream(invocation, &mut sink)?;
        check.require(captured, invocation.tool(), Some(&log))
    }

    /// Feed `script` to `rman target /`.
    ///
    /// # Errors
    ///
    /// Returns `ToolFailed` when RMAN exits non-zero
    pub fn rman(&self, script: &str) -> Result<Captured> {
        let mut text = script.trim().to_string();
        text.push_str("\nEXIT;\n");
        let invocation = self.oracle_tool("rman").args(["target", "/"]).stdin(text);
        self.logged(&invocation, "rman", SuccessCheck::ExitCode)
    }
}

/// What an operation reports back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub summary: String,
    pub output: String,
}

impl Outcome {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: String::new(),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Run `work` and record its duration and result under `operation`.
///
/// # Errors
///
/// Returns whatever `work` returns
pub fn measured<T>(operation: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    let result = work();
    metrics::record_operation(operation, result.is_ok(), started.elapsed());
    if let Err(err) = &result {
        tracing::warn!(operation, error = %err, "operation failed");
    }
    result
}

#[cfg(test)]
pub mod testing {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::Context;
    use crate::{
        config::Config,
        error::Result,
        runner::{Captured, Echo, Executor, Invocation, LineSink},
    };
    use std::{
        path::Path,
        sync::{Arc, Mutex},
    };

    /// Records every invocation and replays canned results.
    ///
    /// The first response whose needle occurs in the command line or the
    /// stdin text wins; anything else exits 0 with no output.
    #[derive(Default)]
    pub struct RecordingExecutor {
        responses: Vec<(String, Captured)>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl RecordingExecutor {
        #[must_use]
        pub fn respond(mut self, needle: &str, exit_code: i32, output: &str) -> Self {
            self.responses.push((
                needle.to_string(),
                Captured {
                    exit_code,
                    output: output.to_string(),
                },
            ));
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Command lines of every call, program first.
        pub fn command_lines(&self) -> Vec<String> {
            self.calls()
                .iter()
                .map(|inv| inv.argv().join(" "))
                .collect()
        }

        /// Text sent on stdin, one entry per call that had any.
        pub fn scripts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|inv| inv.stdin)
                .collect()
        }

        fn reply(&self, invocation: &Invocation) -> Captured {
            self.calls.lock().unwrap().push(invocation.clone());
            let haystack = format!(
                "{}\n{}",
                invocation.argv().join(" "),
                invocation.stdin.as_deref().unwrap_or_default()
            );
            self.responses
                .iter()
                .find(|(needle, _)| haystack.contains(needle.as_str()))
                .map(|(_, captured)| captured.clone())
                .unwrap_or_default()
        }
    }

    impl Executor for RecordingExecutor {
        fn capture(&self, invocation: &Invocation) -> Result<Captured> {
            Ok(self.reply(invocation))
        }

        fn stream(&self, invocation: &Invocation, sink: &mut dyn LineSink) -> Result<Captured> {
            let captured = self.reply(invocation);
            for line in captured.output.lines() {
                sink.line(line)?;
            }
            Ok(captured)
        }

        fn interactive(&self, invocation: &Invocation) -> Result<i32> {
            Ok(self.reply(invocation).exit_code)
        }
    }

    /// Context over `exec` whose logs land in `log_dir` and echo nowhere.
    pub fn context(exec: &Arc<RecordingExecutor>, log_dir: &Path) -> Context {
        let config = Config::default().with_log_dir(log_dir.to_path_buf());
        Context::new(config, exec.clone()).with_echo(Echo::Silent)
    }
}
