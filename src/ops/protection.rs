//! Archive log mode and the fast recovery area.

use super::{Context, Outcome, flashback};
use crate::{error::Result, validation};
use serde::Serialize;

pub const DEFAULT_FRA_SIZE: &str = "10G";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FraStatus {
    pub name: String,
    pub limit_mb: String,
    pub used_mb: String,
    pub reclaimable_mb: String,
    pub files: String,
}

/// Combined view served by the web panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProtectionStatus {
    pub log_mode: String,
    pub flashback_on: String,
    pub fra: Option<FraStatus>,
}

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn archivelog_status(ctx: &Context) -> Result<String> {
    let values = ctx.sql().values("SELECT log_mode FROM v$database;")?;
    Ok(values.into_iter().next().unwrap_or_default())
}

/// # Errors
///
/// Returns `ToolFailed` on SQL errors
pub fn enable_archivelog(ctx: &Context) -> Result<Outcome> {
    let captured = ctx.sql().exit_on_error().execute(
        "SHUTDOWN IMMEDIATE;
STARTUP MOUNT;
ALTER DATABASE ARCHIVELOG;
ALTER DATABASE OPEN;
ARCHIVE LOG LIST;",
    )?;
    Ok(Outcome::new("ARCHIVELOG mode enabled").with_output(captured.output))
}

/// `None` when no recovery destination is configured.
///
/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn fra_status(ctx: &Context) -> Result<Option<FraStatus>> {
    let table = ctx.sql().table(
        "SELECT name, ROUND(space_limit/1024/1024) AS limit_mb, \
         ROUND(space_used/1024/1024) AS used_mb, \
         ROUND(space_reclaimable/1024/1024) AS reclaimable_mb, \
         number_of_files AS files FROM v$recovery_file_dest;",
    )?;
    Ok(table.records().into_iter().next().and_then(|record| {
        let field = |key: &str| record.get(key).cloned().unwrap_or_default();
        let name = field("NAME");
        (!name.is_empty()).then(|| FraStatus {
            name,
            limit_mb: field("LIMIT_MB"),
            used_mb: field("USED_MB"),
            reclaimable_mb: field("RECLAIMABLE_MB"),
            files: field("FILES"),
        })
    }))
}

/// Size first; the destination cannot be set before a size exists.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad size or path and `ToolFailed` on SQL errors
pub fn enable_fra(ctx: &Context, size: &str, dest: Option<&str>) -> Result<Outcome> {
    let size = validation::size(size)?;
    let default_dest = format!("{}/fast_recovery_area", ctx.config.oracle.oracle_base);
    let dest = validation::absolute_path(dest.unwrap_or(&default_dest))?;
    let sql = format!(
        "ALTER SYSTEM SET DB_RECOVERY_FILE_DEST_SIZE={size} SCOPE=BOTH;
ALTER SYSTEM SET DB_RECOVERY_FILE_DEST='{dest}' SCOPE=BOTH;"
    );
    let captured = ctx.sql().exit_on_error().execute(&sql)?;
    Ok(Outcome::new(format!("Fast recovery area set to {dest} ({size})")).with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` if any query fails
pub fn status(ctx: &Context) -> Result<ProtectionStatus> {
    let (log_mode, flashback_on) = flashback::status(ctx)?;
    Ok(ProtectionStatus {
        log_mode,
        flashback_on,
        fra: fra_status(ctx)?,
    })
}
