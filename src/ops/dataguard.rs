//! Physical standby setup and broker role transitions.

use super::{Context, Outcome, labs};
use crate::{error::Result, runner::SuccessCheck, validation};

pub const SETUP_LAB: u8 = 9;

/// # Errors
///
/// Returns `InvalidInput` for bad host or database names, and the lab's
/// own failure otherwise
pub fn setup(ctx: &Context, primary: &str, standby: &str, db_name: &str) -> Result<Outcome> {
    let primary = validation::hostname(primary)?;
    let standby = validation::hostname(standby)?;
    let db_name = validation::identifier("database name", db_name)?;
    labs::run_lab(
        ctx,
        SETUP_LAB,
        &[
            ("PRIMARY_HOST", primary.to_string()),
            ("STANDBY_HOST", standby.to_string()),
            ("DB_NAME", db_name.to_string()),
        ],
    )
}

/// # Errors
///
/// Returns `ToolFailed` if sqlplus cannot connect
pub fn status(ctx: &Context) -> Result<Outcome> {
    let captured = ctx.sql().execute(
        "SET LINESIZE 200 PAGESIZE 100
SELECT database_role, protection_mode, protection_level, switchover_status FROM v$database;
SELECT process, status, thread#, sequence#, block# FROM v$managed_standby;",
    )?;
    Ok(Outcome::new("Data Guard status").with_output(captured.output))
}

fn broker(ctx: &Context, verb: &str, target: &str) -> Result<Outcome> {
    let target = validation::identifier("standby", target)?;
    let invocation = ctx
        .oracle_tool("dgmgrl")
        .args(["-silent", "/"])
        .arg(format!("{verb} to {target}"));
    let captured = ctx.logged(&invocation, "dgmgrl", SuccessCheck::ExitCode)?;
    tracing::info!(verb, target, "role transition complete");
    Ok(Outcome::new(format!("{verb} to {target} completed")).with_output(captured.output))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad target and `ToolFailed` if the broker
/// rejects the transition
pub fn switchover(ctx: &Context, target: &str) -> Result<Outcome> {
    broker(ctx, "switchover", target)
}

/// # Errors
///
/// Returns `InvalidInput` for a bad target and `ToolFailed` if the broker
/// rejects the transition
pub fn failover(ctx: &Context, target: &str) -> Result<Outcome> {
    broker(ctx, "failover", target)
}
