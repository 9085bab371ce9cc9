//! Feed SQL to `sqlplus` over stdin and read its output back.

use crate::{
    config::Config,
    error::Result,
    runner::{
        Captured, Executor, Invocation, LineSink, SuccessCheck,
        check::SQLPLUS,
    },
};
use std::{collections::BTreeMap, time::Duration};

/// Settings for column-separated output that [`parse_sql_rows`] understands.
pub const TABULAR_SETTINGS: &str = "SET PAGESIZE 1000\n\
                                    SET LINESIZE 1000\n\
                                    SET FEEDBACK OFF\n\
                                    SET HEADING ON\n\
                                    SET COLSEP '|'\n\
                                    SET TRIMSPOOL ON\n\
                                    SET TRIMOUT ON\n";

/// Settings for bare values, one row per line.
pub const VALUES_SETTINGS: &str = "SET PAGESIZE 0 FEEDBACK OFF VERIFY OFF HEADING OFF ECHO OFF\n";

/// Makes the first failing statement end the session with a non-zero status.
pub const EXIT_ON_ERROR: &str = "WHENEVER SQLERROR EXIT FAILURE\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connect {
    SysDba,
    SysAsm,
}

impl Connect {
    const fn logon(self) -> &'static str {
        match self {
            Self::SysDba => "/ as sysdba",
            Self::SysAsm => "/ as sysasm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Plain,
    Tabular,
    Values,
}

/// Result set parsed from `COLSEP '|'` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SqlTable {
    /// Rows keyed by column name.
    #[must_use]
    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as an aligned text table.
    #[must_use]
    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(String::len).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let format_row = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = format_row(&self.headers);
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("  "),
        );
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format_row(row));
            out.push('\n');
        }
        out
    }
}

fn is_separator(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | '|' | ' '))
}

fn split_cells(line: &str) -> Vec<String> {
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// Parse `COLSEP '|'` output into a table.
///
/// The header is the first line holding a `|` that is not only dashes.
/// Later lines without a `|`, dash separators, and rows with fewer cells
/// than the header are skipped.
#[must_use]
pub fn parse_sql_rows(output: &str) -> SqlTable {
    let mut lines = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    let Some(headers) = lines
        .by_ref()
        .find(|line| line.contains('|') && !is_separator(line))
        .map(split_cells)
    else {
        return SqlTable::default();
    };

    let rows = lines
        .filter(|line| line.contains('|') && !is_separator(line))
        .map(split_cells)
        .filter(|cells| cells.len() >= headers.len())
        .map(|mut cells| {
            cells.truncate(headers.len());
            cells
        })
        .collect();

    SqlTable { headers, rows }
}

/// A `sqlplus -S -L` session as the Oracle OS user.
pub struct SqlPlus<'a> {
    exec: &'a dyn Executor,
    config: &'a Config,
    connect: Connect,
    format: Format,
    exit_on_error: bool,
    timeout: Option<Duration>,
}

impl<'a> SqlPlus<'a> {
    #[must_use]
    pub fn new(exec: &'a dyn Executor, config: &'a Config) -> Self {
        Self {
            exec,
            config,
            connect: Connect::SysDba,
            format: Format::Plain,
            exit_on_error: false,
            timeout: None,
        }
    }

    #[must_use]
    pub const fn sysasm(mut self) -> Self {
        self.connect = Connect::SysAsm;
        self
    }

    #[must_use]
    pub const fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Stop at the first SQL error and exit non-zero.
    #[must_use]
    pub const fn exit_on_error(mut self) -> Self {
        self.exit_on_error = true;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Full text sent on stdin.
    #[must_use]
    pub fn script(&self, sql: &str) -> String {
        let mut script = String::new();
        if self.exit_on_error {
            script.push_str(EXIT_ON_ERROR);
        }
        match self.format {
            Format::Plain => {}
            Format::Tabular => script.push_str(TABULAR_SETTINGS),
            Format::Values => script.push_str(VALUES_SETTINGS),
        }
        script.push_str(sql.trim_end());
        script.push_str("\nEXIT;\n");
        script
    }

    #[must_use]
    pub fn invocation(&self, sql: &str) -> Invocation {
        let mut invocation = Invocation::new(self.config.oracle_bin("sqlplus"))
            .args(["-S", "-L", self.connect.logon()])
            .envs(self.config.oracle_env())
            .stdin(self.script(sql))
            .as_user(&self.config.oracle.os_user);
        if let Some(limit) = self.timeout {
            invocation = invocation.timeout(limit);
        }
        invocation
    }

    /// Run and return whatever came back, whatever the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if `sqlplus` cannot be started or times out
    pub fn run(&self, sql: &str) -> Result<Captured> {
        self.exec.capture(&self.invocation(sql))
    }

    /// Exit-on-error sessions and queries also fail on `ORA-`/`SP2-` text.
    /// Plain reports tolerate errors in individual statements.
    #[must_use]
    pub const fn check(&self) -> SuccessCheck {
        if self.exit_on_error || !matches!(self.format, Format::Plain) {
            SQLPLUS
        } else {
            SuccessCheck::ExitCode
        }
    }

    /// Run and require success as decided by [`SqlPlus::check`].
    ///
    /// # Errors
    ///
    /// Returns `ToolFailed` on a non-zero exit or an error in the output
    pub fn execute(&self, sql: &str) -> Result<Captured> {
        let captured = self.run(sql)?;
        self.check().require(captured, "sqlplus", None)
    }

    /// Like [`SqlPlus::execute`] but streaming into `sink`.
    ///
    /// # Errors
    ///
    /// Returns `ToolFailed` on a non-zero exit or an error in the output
    pub fn execute_streamed(&self, sql: &str, sink: &mut dyn LineSink) -> Result<Captured> {
        let captured = self.exec.stream(&self.invocation(sql), sink)?;
        self.check().require(captured, "sqlplus", None)
    }

    /// Run a query in tabular format and parse the result set.
    ///
    /// # Errors
    ///
    /// Returns `ToolFailed` on a non-zero exit
    pub fn table(&self, sql: &str) -> Result<SqlTable> {
        let session = SqlPlus {
            format: Format::Tabular,
            ..*self
        };
        Ok(parse_sql_rows(&session.execute(sql)?.output))
    }

    /// Run a query without headings and return the non-empty lines.
    ///
    /// # Errors
    ///
    /// Returns `ToolFailed` on a non-zero exit
    pub fn values(&self, sql: &str) -> Result<Vec<String>> {
        let session = SqlPlus {
            format: Format::Values,
            ..*self
        };
        Ok(session
            .execute(sql)?
            .output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::RecordingExecutor;

    const TABLESPACES: &str = "
TABLESPACE_NAME               |   SIZE_MB|   FREE_MB|AUT
------------------------------|----------|----------|---
SYSTEM                        |       900|        12|YES
SYSAUX                        |       650|        40|YES
ERROR at line 1:
USERS                         |         5|         4|YES
";

    #[test]
    fn test_parse_sql_rows() {
        let table = parse_sql_rows(TABLESPACES);
        assert_eq!(table.headers, ["TABLESPACE_NAME", "SIZE_MB", "FREE_MB", "AUT"]);
        assert_eq!(table.rows.len(), 3);
        let records = table.records();
        let users = records.get(2).unwrap();
        assert_eq!(users.get("TABLESPACE_NAME").map(String::as_str), Some("USERS"));
        assert_eq!(users.get("FREE_MB").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_parse_skips_short_rows_and_no_header() {
        let table = parse_sql_rows("A|B|C\n1|2\n3|4|5\n");
        assert_eq!(table.rows, [vec!["3", "4", "5"]]);
        assert!(parse_sql_rows("ORA-01034: ORACLE not available\n").is_empty());
    }

    #[test]
    fn test_render_aligns_columns() {
        let table = parse_sql_rows("NAME|OPEN_MODE\nGDCPDB|READ WRITE\n");
        assert_eq!(
            table.render(),
            "NAME    OPEN_MODE\n------  ----------\nGDCPDB  READ WRITE\n"
        );
    }

    #[test]
    fn test_script_layout() {
        let exec = RecordingExecutor::default();
        let config = Config::default();
        let script = SqlPlus::new(&exec, &config)
            .exit_on_error()
            .format(Format::Values)
            .script("SELECT name FROM v$database;\n\n");
        assert_eq!(
            script,
            "WHENEVER SQLERROR EXIT FAILURE\n\
             SET PAGESIZE 0 FEEDBACK OFF VERIFY OFF HEADING OFF ECHO OFF\n\
             SELECT name FROM v$database;\nEXIT;\n"
        );
    }

    #[test]
    fn test_invocation_runs_as_oracle() {
        let exec = RecordingExecutor::default();
        let config = Config::default();
        let inv = SqlPlus::new(&exec, &config).sysasm().invocation("SELECT 1 FROM dual;");
        assert_eq!(inv.program, "/u01/app/oracle/product/19.3.0/dbhome_1/bin/sqlplus");
        assert_eq!(inv.args, ["-S", "-L", "/ as sysasm"]);
        assert_eq!(inv.user.as_deref(), Some("oracle"));
    }

    #[test]
    fn test_values_trims_output() {
        let exec = RecordingExecutor::default().respond("sqlplus", 0, "\n  GDCPROD  \n\nOPEN\n");
        let config = Config::default();
        let values = SqlPlus::new(&exec, &config).values("SELECT 1;").unwrap();
        assert_eq!(values, ["GDCPROD", "OPEN"]);
    }

    #[test]
    fn test_execute_fails_on_error_text_with_zero_status() {
        let exec = RecordingExecutor::default().respond(
            "sqlplus",
            0,
            "ERROR at line 1:\nORA-01536: space quota exceeded for tablespace 'USERS'\n",
        );
        let config = Config::default();
        let err = SqlPlus::new(&exec, &config)
            .exit_on_error()
            .execute("INSERT INTO t VALUES (1);")
            .unwrap_err();
        assert!(matches!(err, crate::Error::ToolFailed { exit_code: 0, .. }));
        assert!(err.excerpt().iter().any(|line| line.contains("ORA-01536")));

        let report = SqlPlus::new(&exec, &config).execute("SELECT 1 FROM dual;").unwrap();
        assert!(report.output.contains("ORA-01536"));
    }

    #[test]
    fn test_execute_fails_on_nonzero() {
        let exec = RecordingExecutor::default().respond("sqlplus", 942, "ORA-00942: table or view does not exist");
        let config = Config::default();
        let err = SqlPlus::new(&exec, &config).execute("SELECT * FROM nope;").unwrap_err();
        assert!(matches!(err, crate::Error::ToolFailed { exit_code: 942, .. }));
    }
}
