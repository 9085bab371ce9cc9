use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure an operation can report.
///
/// Input and environment problems are raised before any subprocess starts;
/// tool failures carry the tail of the captured output and the log path.
#[derive(Debug, Error)]
pub enum Error {
    /// External program could not be spawned.
    #[error("{program}: command not found")]
    BinaryNotFound { program: String },

    /// Provisioning script absent from the scripts directory.
    #[error("script not found: {}", .0.display())]
    ScriptMissing(PathBuf),

    #[error("configuration file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("invalid configuration in {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    /// Caller supplied a value that failed its format check.
    #[error("invalid {kind} '{value}': {rule}")]
    InvalidInput {
        kind: &'static str,
        value: String,
        rule: &'static str,
    },

    #[error("{0}")]
    Precondition(String),

    /// Tool ran but exited non-zero or did not print its success marker.
    #[error("{tool} failed (exit code {exit_code})")]
    ToolFailed {
        tool: String,
        exit_code: i32,
        excerpt: Vec<String>,
        log: Option<PathBuf>,
    },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("cancelled by user")]
    Cancelled,

    #[error("step '{step}' failed")]
    PlanFailed { step: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    #[must_use]
    pub fn invalid(kind: &'static str, value: impl Into<String>, rule: &'static str) -> Self {
        Self::InvalidInput {
            kind,
            value: value.into(),
            rule,
        }
    }

    /// Log file associated with the failure, if any.
    #[must_use]
    pub fn log_path(&self) -> Option<&PathBuf> {
        match self {
            Self::ToolFailed { log, .. } => log.as_ref(),
            _ => None,
        }
    }

    /// Output lines captured from the failing tool.
    #[must_use]
    pub fn excerpt(&self) -> &[String] {
        match self {
            Self::ToolFailed { excerpt, .. } => excerpt,
            _ => &[],
        }
    }

    /// True for failures detected before anything was executed.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound { .. }
                | Self::ScriptMissing(_)
                | Self::ConfigMissing(_)
                | Self::ConfigParse { .. }
                | Self::InvalidInput { .. }
                | Self::Precondition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_tool_failed_message() {
        let err = Error::ToolFailed {
            tool: "dbca".to_string(),
            exit_code: 252,
            excerpt: vec!["DBT-10317".to_string()],
            log: Some(PathBuf::from("/var/log/oracledba/dbca.log")),
        };
        assert_eq!(err.to_string(), "dbca failed (exit code 252)");
        assert_eq!(err.excerpt(), ["DBT-10317".to_string()]);
        assert!(err.log_path().is_some());
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            tool: "dbca".to_string(),
            after: Duration::from_secs(1800),
        };
        assert_eq!(err.to_string(), "dbca timed out after 1800s");
    }

    #[test]
    fn test_invalid_input_is_precondition() {
        let err = Error::invalid("identifier", "1BAD", "must start with a letter");
        assert!(err.is_precondition());
        assert_eq!(
            err.to_string(),
            "invalid identifier '1BAD': must start with a letter"
        );
    }
}
