//! Backup and recovery through `rman target /`.

use super::{Context, Outcome};
use crate::{
    error::{Error, Result},
    validation,
};
use chrono::{Local, NaiveDateTime};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Full,
    Incremental,
    Archive,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Archive => "archive",
        })
    }
}

impl FromStr for BackupKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            "archive" => Ok(Self::Archive),
            _ => Err(Error::invalid(
                "backup type",
                s,
                "expected full, incremental or archive",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Backup,
    Archivelog,
    All,
}

impl FromStr for ListKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "backup" => Ok(Self::Backup),
            "archivelog" => Ok(Self::Archivelog),
            "all" => Ok(Self::All),
            _ => Err(Error::invalid(
                "list type",
                s,
                "expected backup, archivelog or all",
            )),
        }
    }
}

#[must_use]
pub fn setup_script(retention_days: u32, compression: bool) -> String {
    let mut script = format!(
        "CONFIGURE RETENTION POLICY TO RECOVERY WINDOW OF {retention_days} DAYS;
CONFIGURE CONTROLFILE AUTOBACKUP ON;
CONFIGURE CONTROLFILE AUTOBACKUP FORMAT FOR DEVICE TYPE DISK TO '/u01/backup/cf_%F';
CONFIGURE DEVICE TYPE DISK PARALLELISM 2 BACKUP TYPE TO BACKUPSET;
CONFIGURE BACKUP OPTIMIZATION ON;
"
    );
    if compression {
        script.push_str(
            "CONFIGURE COMPRESSION ALGORITHM 'MEDIUM' AS OF RELEASE 'DEFAULT' OPTIMIZE FOR LOAD TRUE;\n",
        );
    }
    script.push_str("SHOW ALL;\n");
    script
}

/// Retention window, controlfile autobackup, parallelism and compression.
///
/// # Errors
///
/// Returns `InvalidInput` for a zero retention and `ToolFailed` from RMAN
pub fn setup(ctx: &Context, retention_days: u32, compression: bool) -> Result<Outcome> {
    if retention_days == 0 {
        return Err(Error::invalid("retention", "0", "must be at least one day"));
    }
    let captured = ctx.rman(&setup_script(retention_days, compression))?;
    Ok(Outcome::new(format!(
        "RMAN configured with a {retention_days} day recovery window"
    ))
    .with_output(captured.output))
}

/// `<kind>_YYYYMMDD_HHMMSS`.
#[must_use]
pub fn default_tag(kind: BackupKind, now: NaiveDateTime) -> String {
    format!("{kind}_{}", now.format("%Y%m%d_%H%M%S"))
}

#[must_use]
pub fn backup_script(kind: BackupKind, tag: &str) -> String {
    match kind {
        BackupKind::Full => format!(
            "BACKUP AS COMPRESSED BACKUPSET TAG '{tag}' DATABASE PLUS ARCHIVELOG DELETE INPUT;\n"
        ),
        BackupKind::Incremental => format!(
            "BACKUP AS COMPRESSED BACKUPSET INCREMENTAL LEVEL 1 TAG '{tag}' DATABASE PLUS ARCHIVELOG DELETE INPUT;\n"
        ),
        BackupKind::Archive => {
            format!("BACKUP AS COMPRESSED BACKUPSET TAG '{tag}' ARCHIVELOG ALL DELETE INPUT;\n")
        }
    }
}

/// # Errors
///
/// Returns `InvalidInput` for a malformed tag and `ToolFailed` from RMAN
pub fn backup(ctx: &Context, kind: BackupKind, tag: Option<&str>) -> Result<Outcome> {
    let tag = match tag {
        Some(tag) => validation::rman_tag(tag)?.to_string(),
        None => default_tag(kind, Local::now().naive_local()),
    };
    let captured = ctx.rman(&backup_script(kind, &tag))?;
    Ok(Outcome::new(format!("{kind} backup completed (tag {tag})")).with_output(captured.output))
}

/// Mount, restore, recover and open. A point-in-time recovery opens with
/// `RESETLOGS`.
#[must_use]
pub fn restore_script(until: Option<NaiveDateTime>) -> String {
    let mut script = String::from("SHUTDOWN IMMEDIATE;\nSTARTUP MOUNT;\n");
    match until {
        Some(at) => {
            let clause = format!(
                "UNTIL TIME \"TO_DATE('{}', 'YYYY-MM-DD HH24:MI:SS')\"",
                at.format("%Y-%m-%d %H:%M:%S")
            );
            script.push_str(&format!(
                "RUN {{\n  SET {clause};\n  RESTORE DATABASE;\n  RECOVER DATABASE;\n}}\n"
            ));
            script.push_str("ALTER DATABASE OPEN RESETLOGS;\n");
        }
        None => {
            script.push_str("RESTORE DATABASE;\nRECOVER DATABASE;\nALTER DATABASE OPEN;\n");
        }
    }
    script
}

/// # Errors
///
/// Returns `InvalidInput` for a malformed timestamp and `ToolFailed` from RMAN
pub fn restore(ctx: &Context, until: Option<&str>) -> Result<Outcome> {
    let until = until.map(validation::timestamp).transpose()?;
    let captured = ctx.rman(&restore_script(until))?;
    let summary = until.map_or_else(
        || "Database restored and recovered".to_string(),
        |at| format!("Database restored to {at}"),
    );
    Ok(Outcome::new(summary).with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` from RMAN
pub fn list(ctx: &Context, kind: ListKind) -> Result<Outcome> {
    let script = match kind {
        ListKind::Backup => "LIST BACKUP SUMMARY;",
        ListKind::Archivelog => "LIST ARCHIVELOG ALL;",
        ListKind::All => "LIST BACKUP SUMMARY;\nLIST ARCHIVELOG ALL;",
    };
    let captured = ctx.rman(script)?;
    Ok(Outcome::new("RMAN listing").with_output(captured.output))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::{RecordingExecutor, context};
    use std::sync::Arc;

    #[test]
    fn test_default_tag() {
        let at = validation::timestamp("2024-03-01 08:05:09").unwrap();
        assert_eq!(default_tag(BackupKind::Incremental, at), "incremental_20240301_080509");
    }

    #[test]
    fn test_setup_script() {
        let script = setup_script(14, false);
        assert!(script.contains("RECOVERY WINDOW OF 14 DAYS"));
        assert!(script.contains("TO '/u01/backup/cf_%F'"));
        assert!(!script.contains("COMPRESSION ALGORITHM"));
        assert!(setup_script(7, true).contains("COMPRESSION ALGORITHM 'MEDIUM'"));
        assert!(script.ends_with("SHOW ALL;\n"));
    }

    #[test]
    fn test_backup_scripts() {
        assert!(backup_script(BackupKind::Incremental, "T1").contains("INCREMENTAL LEVEL 1 TAG 'T1'"));
        assert!(backup_script(BackupKind::Archive, "T2").contains("ARCHIVELOG ALL DELETE INPUT"));
        assert!(backup_script(BackupKind::Full, "T3").contains("DATABASE PLUS ARCHIVELOG"));
    }

    #[test]
    fn test_restore_until() {
        let at = validation::timestamp("2024-01-15 10:30:00").unwrap();
        let script = restore_script(Some(at));
        assert!(script.contains("SET UNTIL TIME \"TO_DATE('2024-01-15 10:30:00'"));
        assert!(script.ends_with("ALTER DATABASE OPEN RESETLOGS;\n"));
        assert!(restore_script(None).ends_with("ALTER DATABASE OPEN;\n"));
    }

    #[test]
    fn test_backup_rejects_bad_tag_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let err = backup(&context(&exec, dir.path()), BackupKind::Full, Some("x'; DROP")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_backup_failure_carries_excerpt() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default().respond(
            "BACKUP AS COMPRESSED",
            1,
            "RMAN-03009: failure of backup command\nORA-19809: limit exceeded for recovery files",
        ));
        let err = backup(&context(&exec, dir.path()), BackupKind::Full, Some("NIGHTLY")).unwrap_err();
        assert!(err.excerpt().iter().any(|l| l.contains("ORA-19809")));
        assert_eq!(err.log_path(), Some(&dir.path().join("rman.log")));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("archive".parse::<BackupKind>().unwrap(), BackupKind::Archive);
        assert_eq!("all".parse::<ListKind>().unwrap(), ListKind::All);
        assert!("differential".parse::<BackupKind>().is_err());
    }
}
