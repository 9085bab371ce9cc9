//! Pluggable database lifecycle.

use super::{Context, Outcome};
use crate::{
    error::Result,
    sqlplus::SqlTable,
    validation,
};
use serde::Serialize;

pub const DEFAULT_ADMIN_USER: &str = "PDBADMIN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdbInfo {
    pub name: String,
    pub open_mode: String,
    pub restricted: String,
    pub open_time: String,
}

impl PdbInfo {
    fn from_table(table: &SqlTable) -> Vec<Self> {
        table
            .records()
            .into_iter()
            .map(|record| {
                let field = |key: &str| record.get(key).cloned().unwrap_or_default();
                Self {
                    name: field("NAME"),
                    open_mode: field("OPEN_MODE"),
                    restricted: field("RESTRICTED"),
                    open_time: field("OPEN_TIME"),
                }
            })
            .collect()
    }
}

const LIST_SQL: &str = "SELECT name, open_mode, restricted, \
                        TO_CHAR(open_time, 'YYYY-MM-DD HH24:MI:SS') AS open_time \
                        FROM v$pdbs ORDER BY con_id;";

#[must_use]
pub fn create_sql(name: &str, admin_user: &str, admin_password: &str) -> String {
    format!(
        "CREATE PLUGGABLE DATABASE {name} ADMIN USER {admin_user} IDENTIFIED BY \"{admin_password}\"
  FILE_NAME_CONVERT=('pdbseed','{lower}');
ALTER PLUGGABLE DATABASE {name} OPEN;
ALTER PLUGGABLE DATABASE {name} SAVE STATE;",
        lower = name.to_lowercase()
    )
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name, user or password, and
/// `ToolFailed` if any statement fails
pub fn create(ctx: &Context, name: &str, admin_user: &str, admin_password: &str) -> Result<Outcome> {
    let name = validation::pdb_name(name)?;
    let admin_user = validation::identifier("admin user", admin_user)?;
    let admin_password = validation::password(admin_password)?;
    let captured = ctx
        .sql()
        .exit_on_error()
        .execute(&create_sql(name, admin_user, admin_password))?;
    tracing::info!(pdb = name, "pluggable database created");
    Ok(Outcome::new(format!("PDB {name} created and opened")).with_output(captured.output))
}

/// # Errors
///
/// Returns `InvalidInput` for bad names and `ToolFailed` if the clone fails
pub fn clone(ctx: &Context, source: &str, target: &str) -> Result<Outcome> {
    let source = validation::pdb_name(source)?;
    let target = validation::pdb_name(target)?;
    let sql = format!(
        "CREATE PLUGGABLE DATABASE {target} FROM {source}
  FILE_NAME_CONVERT=('{src}','{dst}');
ALTER PLUGGABLE DATABASE {target} OPEN;
ALTER PLUGGABLE DATABASE {target} SAVE STATE;",
        src = source.to_lowercase(),
        dst = target.to_lowercase()
    );
    let captured = ctx.sql().exit_on_error().execute(&sql)?;
    Ok(Outcome::new(format!("PDB {target} cloned from {source}")).with_output(captured.output))
}

/// # Errors
///
/// Returns `ToolFailed` if the query fails
pub fn list(ctx: &Context) -> Result<Vec<PdbInfo>> {
    let table = ctx.sql().table(LIST_SQL)?;
    Ok(PdbInfo::from_table(&table))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn open(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::pdb_name(name)?;
    let sql = format!(
        "ALTER PLUGGABLE DATABASE {name} OPEN;\nALTER PLUGGABLE DATABASE {name} SAVE STATE;"
    );
    ctx.sql().exit_on_error().execute(&sql)?;
    Ok(Outcome::new(format!("PDB {name} opened")))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn close(ctx: &Context, name: &str) -> Result<Outcome> {
    let name = validation::pdb_name(name)?;
    ctx.sql()
        .exit_on_error()
        .execute(&format!("ALTER PLUGGABLE DATABASE {name} CLOSE IMMEDIATE;"))?;
    Ok(Outcome::new(format!("PDB {name} closed")))
}

/// Close, then drop. Datafiles are kept unless `including_datafiles`.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad name and `ToolFailed` on SQL errors
pub fn drop(ctx: &Context, name: &str, including_datafiles: bool) -> Result<Outcome> {
    let name = validation::pdb_name(name)?;
    let datafiles = if including_datafiles {
        "INCLUDING DATAFILES"
    } else {
        "KEEP DATAFILES"
    };
    // A PDB that is already closed makes the first statement fail.
    let sql = format!(
        "ALTER PLUGGABLE DATABASE {name} CLOSE IMMEDIATE;\n\
         WHENEVER SQLERROR EXIT FAILURE\n\
         DROP PLUGGABLE DATABASE {name} {datafiles};"
    );
    let captured = ctx.sql().execute(&sql)?;
    Ok(Outcome::new(format!("PDB {name} dropped")).with_output(captured.output))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::{
        Error,
        ops::testing::{RecordingExecutor, context},
    };
    use std::sync::Arc;

    #[test]
    fn test_create_sql() {
        let sql = create_sql("SALESPDB", "PDBADMIN", "Secret123");
        assert!(sql.contains("ADMIN USER PDBADMIN IDENTIFIED BY \"Secret123\""));
        assert!(sql.contains("FILE_NAME_CONVERT=('pdbseed','salespdb')"));
        assert!(sql.ends_with("ALTER PLUGGABLE DATABASE SALESPDB SAVE STATE;"));
    }

    #[test]
    fn test_create_rejects_injection() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(&exec, dir.path());
        let err = create(&ctx, "X; DROP USER SYS", DEFAULT_ADMIN_USER, "Secret123").unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_create_is_exit_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        create(&context(&exec, dir.path()), "HRPDB", DEFAULT_ADMIN_USER, "Secret123").unwrap();
        let scripts = exec.scripts();
        let script = scripts.first().unwrap();
        assert!(script.starts_with("WHENEVER SQLERROR EXIT FAILURE\n"));
        assert!(script.ends_with("EXIT;\n"));
    }

    #[test]
    fn test_list_parses_rows() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default().respond(
            "v$pdbs",
            0,
            "NAME     |OPEN_MODE |RESTRICTED|OPEN_TIME\n\
             ---------|----------|----------|-------------------\n\
             PDB$SEED |READ ONLY |NO        |2024-03-01 08:00:00\n\
             GDCPDB   |READ WRITE|NO        |2024-03-01 08:00:05\n",
        ));
        let pdbs = list(&context(&exec, dir.path())).unwrap();
        assert_eq!(pdbs.len(), 2);
        let gdc = pdbs.last().unwrap();
        assert_eq!(gdc.name, "GDCPDB");
        assert_eq!(gdc.open_mode, "READ WRITE");
        assert_eq!(gdc.restricted, "NO");
        assert_eq!(gdc.open_time, "2024-03-01 08:00:05");
    }

    #[test]
    fn test_drop_closes_first() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        drop(&context(&exec, dir.path()), "OLDPDB", true).unwrap();
        let scripts = exec.scripts();
        let script = scripts.first().unwrap();
        let close_at = script.find("CLOSE IMMEDIATE").unwrap();
        let drop_at = script.find("DROP PLUGGABLE DATABASE OLDPDB INCLUDING DATAFILES").unwrap();
        assert!(close_at < drop_at);
    }

    #[test]
    fn test_clone_converts_names() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        clone(&context(&exec, dir.path()), "GDCPDB", "TESTPDB").unwrap();
        assert!(exec.scripts().concat().contains("FROM GDCPDB\n  FILE_NAME_CONVERT=('gdcpdb','testpdb')"));
    }
}
