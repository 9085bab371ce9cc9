//! Tablespaces, control files and online redo logs.

use super::{Context, Outcome};
use crate::{
    error::{Error, Result},
    sqlplus::SqlTable,
    validation,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablespaceInfo {
    pub name: String,
    pub size_mb: String,
    pub free_mb: String,
    pub used_mb: String,
    pub pct_used: String,
    pub autoextensible: String,
}

const TABLESPACES_SQL: &str = "SELECT df.tablespace_name AS name,
  ROUND(df.bytes/1024/1024) AS size_mb,
  ROUND(NVL(fs.bytes,0)/1024/1024) AS free_mb,
  ROUND((df.bytes-NVL(fs.bytes,0))/1024/1024) AS used_mb,
  ROUND((df.bytes-NVL(fs.bytes,0))/df.bytes*100,1) AS pct_used,
  df.autoext AS autoextensible
FROM (SELECT tablespace_name, SUM(bytes) bytes, MAX(autoextensible) autoext
      FROM dba_data_files GROUP BY tablespace_name) df
LEFT JOIN (SELECT tablespace_name, SUM(bytes) bytes
      FROM dba_free_space GROUP BY tablespace_name) fs
ON df.tablespace_name = fs.tablespace_name
ORDER BY df.tablespace_name;";

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn tablespaces(ctx: &Context) -> Result<Vec<TablespaceInfo>> {
    let table = ctx.sql().table(TABLESPACES_SQL)?;
    Ok(table
        .records()
        .into_iter()
        .map(|record| {
            let field = |key: &str| record.get(key).cloned().unwrap_or_default();
            TablespaceInfo {
                name: field("NAME"),
                size_mb: field("SIZE_MB"),
                free_mb: field("FREE_MB"),
                used_mb: field("USED_MB"),
                pct_used: field("PCT_USED"),
                autoextensible: field("AUTOEXTENSIBLE"),
            }
        })
        .collect())
}

/// `<oracle_base>/oradata/<DB_NAME>/<name>01.dbf`
#[must_use]
pub fn datafile_path(ctx: &Context, name: &str) -> String {
    format!(
        "{}/oradata/{}/{}01.dbf",
        ctx.config.oracle.oracle_base,
        ctx.config.database.db_name,
        name.to_lowercase()
    )
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name or size and `ToolFailed` on SQL errors
pub fn create_tablespace(ctx: &Context, name: &str, size: &str, autoextend: bool) -> Result<Outcome> {
    let name = validation::identifier("tablespace", name)?;
    let size = validation::size(size)?;
    let datafile = datafile_path(ctx, name);
    let extend = if autoextend {
        " AUTOEXTEND ON NEXT 100M MAXSIZE UNLIMITED"
    } else {
        ""
    };
    ctx.sql().exit_on_error().execute(&format!(
        "CREATE TABLESPACE {name} DATAFILE '{datafile}' SIZE {size}{extend};"
    ))?;
    Ok(Outcome::new(format!("Tablespace {name} created ({size})")))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad or system tablespace name and
/// `ToolFailed` on SQL errors
pub fn drop_tablespace(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::identifier("tablespace", name)?;
    if matches!(name, "SYSTEM" | "SYSAUX") {
        return Err(Error::invalid("tablespace", name, "system tablespaces cannot be dropped"));
    }
    ctx.sql().exit_on_error().execute(&format!(
        "DROP TABLESPACE {name} INCLUDING CONTENTS AND DATAFILES;"
    ))?;
    Ok(Outcome::new(format!("Tablespace {name} dropped")))
}

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn controlfiles(ctx: &Context) -> Result<SqlTable> {
    ctx.sql()
        .table("SELECT name, status, ROUND(block_size*file_size_blks/1024/1024,1) AS size_mb FROM v$controlfile;")
}

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn redo_logs(ctx: &Context) -> Result<SqlTable> {
    ctx.sql().table(
        "SELECT l.group#, l.thread#, l.sequence#, ROUND(l.bytes/1024/1024) AS size_mb, \
         l.members, l.status, f.member \
         FROM v$log l JOIN v$logfile f ON l.group# = f.group# ORDER BY l.group#;",
    )
}

/// Adds one group after the highest existing group number.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad size and `ToolFailed` on SQL errors
pub fn add_redo_log(ctx: &Context, size: &str) -> Result<Outcome> {
    let size = validation::size(size)?;
    let current = ctx.sql().values("SELECT MAX(group#) FROM v$log;")?;
    let group = current
        .first()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(0)
        + 1;
    let member = format!(
        "{}/oradata/{}/redo{group:02}.log",
        ctx.config.oracle.oracle_base, ctx.config.database.db_name
    );
    ctx.sql().exit_on_error().execute(&format!(
        "ALTER DATABASE ADD LOGFILE GROUP {group} ('{member}') SIZE {size};"
    ))?;
    Ok(Outcome::new(format!("Redo log group {group} added ({size})")))
}

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn tablespace_usage(ctx: &Context) -> Result<SqlTable> {
    ctx.sql().table(
        "SELECT tablespace_name, ROUND(used_space*8192/1024/1024) AS used_mb, \
         ROUND(tablespace_size*8192/1024/1024) AS size_mb, \
         ROUND(used_percent,1) AS pct_used \
         FROM dba_tablespace_usage_metrics ORDER BY used_percent DESC;",
    )
}
