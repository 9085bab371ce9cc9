//! Human-facing banners shared by the CLI and the sequencer.

use colored::Colorize;
use std::time::Duration;

/// `12m 03s`.
#[must_use]
pub fn elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m {:02}s", secs / 60, secs % 60)
}

#[must_use]
pub fn header(title: &str) -> String {
    format!("═══ {title} ═══").cyan().bold().to_string()
}

#[must_use]
pub fn success(message: &str) -> String {
    format!("✓ {message}").green().to_string()
}

#[must_use]
pub fn failure(message: &str) -> String {
    format!("✗ {message}").red().bold().to_string()
}

#[must_use]
pub fn warning(message: &str) -> String {
    format!("⚠ {message}").yellow().to_string()
}

#[must_use]
pub fn info(message: &str) -> String {
    message.cyan().to_string()
}

/// Failure banner followed by the log path and the output excerpt.
#[must_use]
pub fn error_report(err: &crate::Error) -> String {
    let mut out = failure(&err.to_string());
    if let Some(log) = err.log_path() {
        out.push_str(&format!("\n  Log: {}", log.display()));
    }
    let excerpt = err.excerpt();
    if !excerpt.is_empty() {
        out.push_str(&format!("\n  Last {} lines of output:", excerpt.len()));
        for line in excerpt {
            out.push_str("\n    ");
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_elapsed() {
        assert_eq!(elapsed(Duration::from_secs(0)), "0m 00s");
        assert_eq!(elapsed(Duration::from_secs(723)), "12m 03s");
    }

    #[test]
    fn test_error_report_lists_log_and_excerpt() {
        colored::control::set_override(false);
        let err = crate::Error::ToolFailed {
            tool: "bash".to_string(),
            exit_code: 1,
            excerpt: vec!["ORA-01031: insufficient privileges".to_string()],
            log: Some("/var/log/oracledba/tp06-securite-acces.sh.log".into()),
        };
        let report = error_report(&err);
        assert!(report.starts_with("✗ bash failed (exit code 1)"));
        assert!(report.contains("Log: /var/log/oracledba/tp06-securite-acces.sh.log"));
        assert!(report.contains("    ORA-01031: insufficient privileges"));
    }
}
