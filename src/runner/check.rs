use super::Captured;
use crate::error::{Error, Result};
use std::path::Path;

/// How many trailing output lines accompany a tool failure.
pub const EXCERPT_LINES: usize = 20;

/// How a combined check joins the exit code and the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Require {
    Both,
    Either,
}

/// Named success predicate for one external tool.
///
/// Several Oracle tools exit 0 on failure or non-zero on success, so the
/// captured text is part of the verdict for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessCheck {
    ExitCode,
    Marker(&'static str),
    Combined {
        marker: &'static str,
        mode: Require,
    },
    /// Zero exit code and none of the error markers in the output.
    Clean(&'static [&'static str]),
}

/// `runInstaller` returns 6 on warnings that still leave a usable home.
pub const RUN_INSTALLER: SuccessCheck = SuccessCheck::Marker("Successfully Setup Software");

pub const DBCA: SuccessCheck = SuccessCheck::Combined {
    marker: "100% complete",
    mode: Require::Either,
};

/// The shell keeps only the low byte of the status, so `ORA-01536` exits 0.
pub const SQLPLUS: SuccessCheck = SuccessCheck::Clean(&["ORA-", "SP2-"]);

impl SuccessCheck {
    #[must_use]
    pub fn evaluate(&self, captured: &Captured) -> bool {
        match *self {
            Self::ExitCode => captured.exit_code == 0,
            Self::Marker(marker) => captured.output.contains(marker),
            Self::Combined { marker, mode } => {
                let exit_ok = captured.exit_code == 0;
                let marker_ok = captured.output.contains(marker);
                match mode {
                    Require::Both => exit_ok && marker_ok,
                    Require::Either => exit_ok || marker_ok,
                }
            }
            Self::Clean(markers) => {
                captured.exit_code == 0
                    && !markers.iter().any(|marker| captured.output.contains(marker))
            }
        }
    }

    /// Pass the capture through when the predicate holds.
    ///
    /// # Errors
    ///
    /// Returns `ToolFailed` with the tail of the output otherwise
    pub fn require(self, captured: Captured, tool: &str, log: Option<&Path>) -> Result<Captured> {
        if self.evaluate(&captured) {
            return Ok(captured);
        }

        tracing::warn!(tool, exit_code = captured.exit_code, "tool reported failure");

        Err(Error::ToolFailed {
            tool: tool.to_string(),
            exit_code: captured.exit_code,
            excerpt: captured.tail(EXCERPT_LINES),
            log: log.map(Path::to_path_buf),
        })
    }
}
