//! Flashback database and table recovery.

use super::{Context, Outcome};
use crate::{
    error::{Error, Result},
    validation,
};
use chrono::NaiveDateTime;
use std::str::FromStr;

pub const DEFAULT_RETENTION_MINUTES: u32 = 2880;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Point to flash the database back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Timestamp(NaiveDateTime),
    Scn(u64),
}

impl Target {
    fn clause(self) -> String {
        match self {
            Self::Timestamp(at) => format!(
                "TO TIMESTAMP TO_TIMESTAMP('{}', 'YYYY-MM-DD HH24:MI:SS')",
                at.format(TIMESTAMP_FORMAT)
            ),
            Self::Scn(scn) => format!("TO SCN {scn}"),
        }
    }
}

/// An all-digit value is an SCN, anything else must be a timestamp.
impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            s.parse()
                .map(Self::Scn)
                .map_err(|_| Error::invalid("SCN", s, "must fit in 64 bits"))
        } else {
            validation::timestamp(s).map(Self::Timestamp)
        }
    }
}

#[must_use]
pub fn enable_sql(retention_minutes: u32) -> String {
    format!(
        "ALTER SYSTEM SET DB_FLASHBACK_RETENTION_TARGET={retention_minutes} SCOPE=BOTH;
SHUTDOWN IMMEDIATE;
STARTUP MOUNT;
ALTER DATABASE FLASHBACK ON;
ALTER DATABASE OPEN;"
    )
}

/// # Errors
///
/// Returns `InvalidInput` for a zero retention and `ToolFailed` on SQL errors
pub fn enable(ctx: &Context, retention_minutes: u32) -> Result<Outcome> {
    if retention_minutes == 0 {
        return Err(Error::invalid(
            "retention",
            "0",
            "must be at least one minute",
        ));
    }
    let captured = ctx
        .sql()
        .exit_on_error()
        .execute(&enable_sql(retention_minutes))?;
    Ok(Outcome::new(format!(
        "Flashback enabled with {retention_minutes} minutes retention"
    ))
    .with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` on SQL errors
pub fn disable(ctx: &Context) -> Result<Outcome> {
    ctx.sql()
        .exit_on_error()
        .execute("ALTER DATABASE FLASHBACK OFF;")?;
    Ok(Outcome::new("Flashback disabled"))
}

#[must_use]
pub fn restore_sql(target: Target) -> String {
    format!(
        "SHUTDOWN IMMEDIATE;
STARTUP MOUNT;
FLASHBACK DATABASE {};
ALTER DATABASE OPEN RESETLOGS;",
        target.clause()
    )
}

/// Flash the whole database back and open it with `RESETLOGS`.
///
/// # Errors
///
/// Returns `ToolFailed` on SQL errors
pub fn restore(ctx: &Context, target: Target) -> Result<Outcome> {
    tracing::warn!(?target, "flashing back database");
    let captured = ctx.sql().exit_on_error().execute(&restore_sql(target))?;
    let point = match target {
        Target::Timestamp(at) => at.format(TIMESTAMP_FORMAT).to_string(),
        Target::Scn(scn) => format!("SCN {scn}"),
    };
    Ok(Outcome::new(format!("Database flashed back to {point}")).with_output(captured.output))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad table or timestamp and `ToolFailed` on
/// SQL errors
pub fn flashback_table(ctx: &Context, table: &str, timestamp: &str) -> Result<Outcome> {
    let table = validation::table_name(table)?;
    let at = validation::timestamp(timestamp)?;
    let sql = format!(
        "ALTER TABLE {table} ENABLE ROW MOVEMENT;
FLASHBACK TABLE {table} TO TIMESTAMP TO_TIMESTAMP('{}', 'YYYY-MM-DD HH24:MI:SS');",
        at.format(TIMESTAMP_FORMAT)
    );
    let captured = ctx.sql().exit_on_error().execute(&sql)?;
    Ok(Outcome::new(format!("Table {table} flashed back to {at}")).with_output(captured.output))
}

/// `(log_mode, flashback_on)` from `v$database`.
///
/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn status(ctx: &Context) -> Result<(String, String)> {
    let values = ctx
        .sql()
        .values("SELECT log_mode || '|' || flashback_on FROM v$database;")?;
    let line = values.first().cloned().unwrap_or_default();
    let (log_mode, flashback_on) = line.split_once('|').unwrap_or((line.as_str(), ""));
    Ok((log_mode.trim().to_string(), flashback_on.trim().to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::{RecordingExecutor, context};
    use std::sync::Arc;

    #[test]
    fn test_target_parse() {
        assert_eq!("1234567".parse::<Target>().unwrap(), Target::Scn(1_234_567));
        assert!(matches!(
            "2024-01-15 10:30:00".parse::<Target>().unwrap(),
            Target::Timestamp(_)
        ));
        assert!("yesterday".parse::<Target>().is_err());
        assert!("99999999999999999999999".parse::<Target>().is_err());
    }

    #[test]
    fn test_restore_sql() {
        let sql = restore_sql("2024-01-15 10:30:00".parse().unwrap());
        assert!(sql.contains(
            "FLASHBACK DATABASE TO TIMESTAMP TO_TIMESTAMP('2024-01-15 10:30:00', 'YYYY-MM-DD HH24:MI:SS');"
        ));
        assert!(sql.starts_with("SHUTDOWN IMMEDIATE;\nSTARTUP MOUNT;"));
        assert!(sql.ends_with("OPEN RESETLOGS;"));
        assert!(restore_sql(Target::Scn(42)).contains("FLASHBACK DATABASE TO SCN 42;"));
    }

    #[test]
    fn test_enable_sql_order() {
        let sql = enable_sql(DEFAULT_RETENTION_MINUTES);
        assert!(sql.starts_with("ALTER SYSTEM SET DB_FLASHBACK_RETENTION_TARGET=2880"));
        assert!(sql.find("STARTUP MOUNT").unwrap() < sql.find("FLASHBACK ON").unwrap());
    }

    #[test]
    fn test_flashback_table_enables_row_movement() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(&exec, dir.path());
        flashback_table(&ctx, "HR.EMPLOYEES", "2024-02-01 09:00:00").unwrap();
        let script = exec.scripts().concat();
        assert!(script.contains("ALTER TABLE HR.EMPLOYEES ENABLE ROW MOVEMENT;"));
        assert!(flashback_table(&ctx, "hr.employees", "2024-02-01 09:00:00").is_err());
        assert_eq!(exec.calls().len(), 1);
    }

    #[test]
    fn test_status() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default().respond("flashback_on", 0, "ARCHIVELOG|YES\n"));
        let (log_mode, flashback) = status(&context(&exec, dir.path())).unwrap();
        assert_eq!(log_mode, "ARCHIVELOG");
        assert_eq!(flashback, "YES");
    }
}
