//! Automatic Storage Management disk groups.

use super::{Context, Outcome, labs};
use crate::{
    error::{Error, Result},
    validation,
};
use std::{fmt, str::FromStr};

pub const SETUP_LAB: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redundancy {
    External,
    Normal,
    High,
}

impl Redundancy {
    /// Fewest disks the redundancy level accepts.
    #[must_use]
    pub const fn min_disks(self) -> usize {
        match self {
            Self::External => 1,
            Self::Normal => 2,
            Self::High => 3,
        }
    }
}

impl fmt::Display for Redundancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::External => "EXTERNAL",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        })
    }
}

impl FromStr for Redundancy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "external" => Ok(Self::External),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(Error::invalid(
                "redundancy",
                s,
                "expected external, normal or high",
            )),
        }
    }
}

/// # Errors
///
/// Returns `InvalidInput` for a bad disk path and the lab's failure otherwise
pub fn setup(ctx: &Context, disks: &[String]) -> Result<Outcome> {
    for disk in disks {
        validation::disk_path(disk)?;
    }
    labs::run_lab(ctx, SETUP_LAB, &[("ASM_DISKS", disks.join(","))])
}

#[must_use]
pub fn create_diskgroup_sql(name: &str, redundancy: Redundancy, disks: &[String]) -> String {
    let disks = disks
        .iter()
        .map(|disk| format!("'{disk}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE DISKGROUP {name} {redundancy} REDUNDANCY DISK {disks};")
}

/// Runs `/ as sysasm` against the ASM instance.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad name, disk path or too few disks, and
/// `ToolFailed` on SQL errors
pub fn create_diskgroup(
    ctx: &Context,
    name: &str,
    redundancy: Redundancy,
    disks: &[String],
) -> Result<Outcome> {
    let name = validation::identifier("diskgroup", name)?;
    for disk in disks {
        validation::disk_path(disk)?;
    }
    if disks.len() < redundancy.min_disks() {
        return Err(Error::invalid(
            "disks",
            disks.join(","),
            "not enough disks for the requested redundancy",
        ));
    }
    let captured = ctx
        .sql()
        .sysasm()
        .exit_on_error()
        .execute(&create_diskgroup_sql(name, redundancy, disks))?;
    Ok(Outcome::new(format!(
        "Disk group {name} created with {redundancy} redundancy"
    ))
    .with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` if the ASM instance is unreachable
pub fn status(ctx: &Context) -> Result<Outcome> {
    let captured = ctx.sql().sysasm().execute(
        "SET LINESIZE 200 PAGESIZE 100
SELECT name, state, type, total_mb, free_mb FROM v$asm_diskgroup;
SELECT group_number, name, path, mount_status, total_mb, free_mb FROM v$asm_disk ORDER BY group_number;",
    )?;
    Ok(Outcome::new("ASM status").with_output(captured.output))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::{RecordingExecutor, context};
    use std::sync::Arc;

    fn disks(paths: &[&str]) -> Vec<String> {
        paths.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_create_diskgroup_sysasm() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        create_diskgroup(
            &context(&exec, dir.path()),
            "DATA",
            Redundancy::Normal,
            &disks(&["/dev/oracleasm/disk1", "/dev/oracleasm/disk2"]),
        )
        .unwrap();
        let calls = exec.calls();
        let call = calls.first().unwrap();
        assert!(call.args.contains(&"/ as sysasm".to_string()));
        assert!(call.stdin.as_deref().unwrap().contains(
            "CREATE DISKGROUP DATA NORMAL REDUNDANCY DISK '/dev/oracleasm/disk1', '/dev/oracleasm/disk2';"
        ));
    }

    #[test]
    fn test_redundancy_needs_disks() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(&exec, dir.path());
        assert!(create_diskgroup(&ctx, "FRA", Redundancy::High, &disks(&["/dev/sdb", "/dev/sdc"])).is_err());
        assert!(create_diskgroup(&ctx, "FRA", Redundancy::External, &disks(&["/dev/sdb;reboot"])).is_err());
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_redundancy_parse() {
        assert_eq!("HIGH".parse::<Redundancy>().unwrap(), Redundancy::High);
        assert_eq!(Redundancy::External.to_string(), "EXTERNAL");
        assert!("mirror".parse::<Redundancy>().is_err());
    }
}
