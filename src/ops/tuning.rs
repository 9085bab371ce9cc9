//! Performance diagnostics: AWR, ADDM and SQL tracing.

use super::{Context, Outcome, labs};
use crate::error::{Error, Result};
use chrono::Local;
use std::{fs, path::PathBuf};

pub const ANALYZE_LAB: u8 = 10;

/// # Errors
///
/// Returns the lab's failure
pub fn analyze(ctx: &Context, deep: bool) -> Result<Outcome> {
    let depth = if deep { "deep" } else { "standard" };
    labs::run_lab(ctx, ANALYZE_LAB, &[("ANALYZE_DEPTH", depth.to_string())])
}

/// A report window and the instance it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub dbid: u64,
    pub instance: u32,
    pub begin: u64,
    pub end: u64,
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>, what: &'static str) -> Result<T> {
    value
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| Error::Precondition(format!("could not read {what} from the database")))
}

/// Fill in missing snapshot ids with the two most recent snapshots.
///
/// # Errors
///
/// Returns `InvalidInput` when `begin` is not before `end`, `Precondition`
/// when fewer than two snapshots exist
pub fn resolve_window(ctx: &Context, begin: Option<u64>, end: Option<u64>) -> Result<Window> {
    let ids = ctx
        .sql()
        .values("SELECT d.dbid || ' ' || i.instance_number FROM v$database d, v$instance i;")?;
    let line = ids.first().map(String::as_str).unwrap_or_default();
    let mut parts = line.split_whitespace();
    let dbid = parse_number(parts.next(), "DBID")?;
    let instance = parse_number(parts.next(), "instance number")?;

    let (begin, end) = match (begin, end) {
        (Some(begin), Some(end)) => (begin, end),
        _ => {
            let recent = ctx.sql().values(
                "SELECT snap_id FROM (SELECT snap_id FROM dba_hist_snapshot \
                 ORDER BY snap_id DESC) WHERE ROWNUM <= 2;",
            )?;
            let snaps: Vec<u64> = recent.iter().filter_map(|v| v.parse().ok()).collect();
            let [latest, previous] = snaps.as_slice() else {
                return Err(Error::Precondition(
                    "at least two AWR snapshots are required".to_string(),
                ));
            };
            (begin.unwrap_or(*previous), end.unwrap_or(*latest))
        }
    };
    if begin >= end {
        return Err(Error::invalid(
            "snapshot range",
            format!("{begin}-{end}"),
            "begin must be lower than end",
        ));
    }
    Ok(Window {
        dbid,
        instance,
        begin,
        end,
    })
}

const REPORT_SETTINGS: &str = "SET LONG 1000000 LONGCHUNKSIZE 1000000 LINESIZE 1500 TRIMSPOOL ON\n";

fn write_report(ctx: &Context, name: &str, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(&ctx.config.paths.log_dir)?;
    let path = ctx.config.paths.log_dir.join(name);
    fs::write(&path, text)?;
    Ok(path)
}

/// Text AWR report saved as `awr_<begin>_<end>.txt` in the log directory.
///
/// # Errors
///
/// Returns the errors of [`resolve_window`], `ToolFailed` on SQL errors and
/// `Io` if the report cannot be written
pub fn awr(ctx: &Context, begin: Option<u64>, end: Option<u64>) -> Result<Outcome> {
    let window = resolve_window(ctx, begin, end)?;
    let sql = format!(
        "{REPORT_SETTINGS}SELECT output FROM TABLE(DBMS_WORKLOAD_REPOSITORY.AWR_REPORT_TEXT({}, {}, {}, {}));",
        window.dbid, window.instance, window.begin, window.end
    );
    let lines = ctx.sql().values(&sql)?;
    let path = write_report(
        ctx,
        &format!("awr_{}_{}.txt", window.begin, window.end),
        &(lines.join("\n") + "\n"),
    )?;
    Ok(Outcome::new(format!("AWR report written to {}", path.display())))
}

/// ADDM findings for the window, saved as `addm_<begin>_<end>.txt`.
///
/// # Errors
///
/// Same as [`awr`]
pub fn addm(ctx: &Context, begin: Option<u64>, end: Option<u64>) -> Result<Outcome> {
    let window = resolve_window(ctx, begin, end)?;
    let task = format!(
        "ORADBA_ADDM_{}_{}_{}",
        window.begin,
        window.end,
        Local::now().format("%H%M%S")
    );
    let sql = format!(
        "{REPORT_SETTINGS}BEGIN
  DBMS_ADDM.ANALYZE_INST('{task}', {begin}, {end});
END;
/
SELECT DBMS_ADDM.GET_REPORT('{task}') FROM dual;",
        begin = window.begin,
        end = window.end
    );
    let lines = ctx.sql().exit_on_error().values(&sql)?;
    let path = write_report(
        ctx,
        &format!("addm_{}_{}.txt", window.begin, window.end),
        &(lines.join("\n") + "\n"),
    )?;
    Ok(Outcome::new(format!("ADDM report written to {}", path.display())))
}

/// Trace another session with waits and binds, or the current one.
///
/// # Errors
///
/// Returns `ToolFailed` on SQL errors
pub fn sql_trace(ctx: &Context, sid: Option<u32>) -> Result<Outcome> {
    let (sql, summary) = match sid {
        Some(sid) => (
            format!("EXEC DBMS_MONITOR.SESSION_TRACE_ENABLE({sid}, NULL, TRUE, TRUE);"),
            format!("SQL trace enabled for session {sid}"),
        ),
        None => (
            "ALTER SESSION SET SQL_TRACE=TRUE;".to_string(),
            "SQL trace enabled for the current session".to_string(),
        ),
    };
    ctx.sql().exit_on_error().execute(&sql)?;
    Ok(Outcome::new(summary))
}
