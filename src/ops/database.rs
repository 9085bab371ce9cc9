//! Instance lifecycle, log locations and session monitoring.

use super::{Context, Outcome, detect};
use crate::{
    error::{Error, Result},
    runner::{SuccessCheck, tail_lines},
    sqlplus::SqlTable,
    validation,
};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_TAIL_LINES: usize = 50;

/// Instance, tablespace and container overview.
///
/// # Errors
///
/// Returns `ToolFailed` if sqlplus cannot connect
pub fn status(ctx: &Context) -> Result<Outcome> {
    let captured = ctx.sql().execute(
        "SET LINESIZE 200 PAGESIZE 100
COLUMN host_name FORMAT A30
SELECT instance_name, status, database_status, host_name, version FROM v$instance;
SELECT tablespace_name, status, contents FROM dba_tablespaces ORDER BY tablespace_name;
SELECT con_id, name, open_mode FROM v$pdbs ORDER BY con_id;",
    )?;
    Ok(Outcome::new("Database status").with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` if the instance fails to start
pub fn start(ctx: &Context) -> Result<Outcome> {
    let captured = ctx.sql().exit_on_error().execute("STARTUP;")?;
    Ok(Outcome::new(format!("Database {} started", ctx.config.database.sid)).with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` if the shutdown fails
pub fn stop(ctx: &Context) -> Result<Outcome> {
    let captured = ctx.sql().exit_on_error().execute("SHUTDOWN IMMEDIATE;")?;
    Ok(Outcome::new(format!("Database {} stopped", ctx.config.database.sid)).with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` if either half fails
pub fn restart(ctx: &Context) -> Result<Outcome> {
    let stopped = stop(ctx)?;
    let started = start(ctx)?;
    Ok(Outcome::new(format!("Database {} restarted", ctx.config.database.sid))
        .with_output(format!("{}{}", stopped.output, started.output)))
}

/// `.sql` files go through sqlplus, `.sh` files through bash.
///
/// # Errors
///
/// Returns `InvalidInput` for other extensions, `ScriptMissing` if the file
/// does not exist and `ToolFailed` if it exits non-zero
pub fn exec_script(ctx: &Context, path: &Path) -> Result<Outcome> {
    let text = path.to_string_lossy();
    let text = validation::absolute_path(&text)?;
    let invocation = match path.extension().and_then(|ext| ext.to_str()) {
        Some("sql") => ctx
            .oracle_tool("sqlplus")
            .args(["-S", "/ as sysdba"])
            .arg(format!("@{text}"))
            .stdin("EXIT;\n"),
        Some("sh") => ctx.as_oracle("bash").arg(text),
        _ => {
            return Err(Error::invalid("script", text, "must end in .sql or .sh"));
        }
    };
    if !path.is_file() {
        return Err(Error::ScriptMissing(path.to_path_buf()));
    }
    let log_name = path
        .file_stem()
        .map_or_else(|| "exec".to_string(), |stem| stem.to_string_lossy().into_owned());
    let captured = ctx.logged(&invocation, &log_name, SuccessCheck::ExitCode)?;
    Ok(Outcome::new(format!("{text} executed")).with_output(captured.output))
}

fn diag_root(ctx: &Context) -> PathBuf {
    ctx.config
        .oracle_home()
        .parent()
        .map_or_else(|| ctx.config.oracle_home().to_path_buf(), Path::to_path_buf)
        .join("diag")
}

/// `<home>/../diag/rdbms/<sid>/<SID>/trace/alert_<SID>.log`
#[must_use]
pub fn alert_log_path(ctx: &Context) -> PathBuf {
    let sid = &ctx.config.database.sid;
    diag_root(ctx)
        .join("rdbms")
        .join(sid.to_lowercase())
        .join(sid)
        .join("trace")
        .join(format!("alert_{sid}.log"))
}

#[must_use]
pub fn listener_log_path(ctx: &Context) -> PathBuf {
    diag_root(ctx)
        .join("tnslsnr")
        .join(detect::hostname())
        .join("listener")
        .join("trace")
        .join("listener.log")
}

/// Last `lines` lines of a log file.
///
/// # Errors
///
/// Returns `Precondition` when the file does not exist
pub fn tail(path: &Path, lines: usize) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::Precondition(format!(
            "log file not found: {}",
            path.display()
        )));
    }
    let bytes = fs::read(path)?;
    Ok(tail_lines(&String::from_utf8_lossy(&bytes), lines))
}

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn sessions(ctx: &Context, active_only: bool) -> Result<SqlTable> {
    let filter = if active_only {
        " AND status = 'ACTIVE'"
    } else {
        ""
    };
    ctx.sql().table(&format!(
        "SELECT sid, serial#, username, status, machine, program, \
         TO_CHAR(logon_time, 'YYYY-MM-DD HH24:MI:SS') AS logon_time \
         FROM v$session WHERE type = 'USER'{filter} ORDER BY logon_time;"
    ))
}

/// Interactive `sqlplus / as sysdba`, optionally inside a PDB.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad PDB name and `BinaryNotFound` if sqlplus
/// is missing
pub fn sqlplus(ctx: &Context, pdb: Option<&str>) -> Result<i32> {
    let mut invocation = ctx.oracle_tool("sqlplus").arg("/ as sysdba");
    if let Some(pdb) = pdb {
        invocation = invocation.env("ORACLE_PDB_SID", validation::pdb_name(pdb)?);
    }
    ctx.exec.interactive(&invocation)
}
