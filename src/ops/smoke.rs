//! Post-install smoke tests against a running database.

use super::{Context, detect::HOME_BINARIES};
use crate::error::Result;
use serde::Serialize;
use std::{fs, path::Path};

pub const REPORT_FILE: &str = "oracle-test-report.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub name: &'static str,
    pub passed: bool,
    pub details: Vec<String>,
}

impl TestResult {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            passed: true,
            details: Vec::new(),
        }
    }

    fn ok(&mut self, detail: impl AsRef<str>) {
        self.details.push(format!("✓ {}", detail.as_ref()));
    }

    fn warn(&mut self, detail: impl AsRef<str>) {
        self.details.push(format!("⚠ {}", detail.as_ref()));
    }

    fn fail(&mut self, detail: impl AsRef<str>) {
        self.details.push(format!("✗ {}", detail.as_ref()));
        self.passed = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SmokeReport {
    pub results: Vec<TestResult>,
}

impl SmokeReport {
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed_count() == self.results.len()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}/{} tests passed",
            self.passed_count(),
            self.results.len()
        )
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("Oracle 19c Test Results\n=======================\n");
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("\n{:<20} {status}\n", result.name));
            for detail in &result.details {
                out.push_str(&format!("    {detail}\n"));
            }
        }
        out.push_str(&format!("\n{}\n", self.summary()));
        out
    }

    /// # Errors
    ///
    /// Returns `Io` if the report cannot be written
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

/// First line of a single-value query.
fn scalar(ctx: &Context, sql: &str) -> Result<String> {
    Ok(ctx.sql().values(sql)?.into_iter().next().unwrap_or_default())
}

fn environment(ctx: &Context) -> TestResult {
    let mut result = TestResult::new("Environment");
    let oracle = &ctx.config.oracle;
    for (label, dir) in [("ORACLE_HOME", &oracle.oracle_home), ("ORACLE_BASE", &oracle.oracle_base)] {
        if Path::new(dir).is_dir() {
            result.ok(format!("{label} exists: {dir}"));
        } else {
            result.fail(format!("{label} not found: {dir}"));
        }
    }
    let user_exists = fs::read_to_string("/etc/passwd").is_ok_and(|passwd| {
        passwd
            .lines()
            .any(|line| line.split(':').next() == Some(oracle.os_user.as_str()))
    });
    if user_exists {
        result.ok(format!("OS user {} exists", oracle.os_user));
    } else {
        result.fail(format!("OS user {} not found", oracle.os_user));
    }
    result
}

fn binaries(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Binaries");
    for binary in HOME_BINARIES {
        if Path::new(&ctx.config.oracle_bin(binary)).is_file() {
            result.ok(format!("{binary} found"));
        } else {
            result.fail(format!("{binary} not found"));
        }
    }
    let version = ctx.exec.capture(&ctx.oracle_tool("sqlplus").arg("-version"))?;
    match version.output.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) if version.success() => result.ok(format!("Version: {line}")),
        _ => result.warn("Could not get version"),
    }
    Ok(result)
}

fn listener(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Listener");
    let status = ctx.exec.capture(&ctx.oracle_tool("lsnrctl").arg("status"))?;
    let text = status.output.to_lowercase();
    if text.contains("ready") || text.contains("connecting") {
        result.ok("Listener is running");
        let sid = &ctx.config.database.sid;
        if text.contains(&sid.to_lowercase()) {
            result.ok(format!("Service {sid} registered"));
        } else {
            result.warn(format!("Service {sid} not registered yet"));
        }
    } else {
        result.fail("Listener not running");
    }
    Ok(result)
}

fn database(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Database");
    if scalar(ctx, "SELECT 'Connected' FROM dual;").ok().as_deref() != Some("Connected") {
        result.fail("Cannot connect to database");
        return Ok(result);
    }
    result.ok("Database connection successful");
    result.ok(format!("Database: {}", scalar(ctx, "SELECT name FROM v$database;")?));
    result.ok(format!("Version: {}", scalar(ctx, "SELECT version FROM v$instance;")?));
    Ok(result)
}

fn instance(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Instance");
    let status = scalar(ctx, "SELECT status FROM v$instance;")?;
    if status == "OPEN" {
        result.ok("Instance status: OPEN");
    } else {
        result.fail(format!("Instance status: {status}"));
    }
    result.ok(format!(
        "Started: {}",
        scalar(
            ctx,
            "SELECT TO_CHAR(startup_time, 'YYYY-MM-DD HH24:MI:SS') FROM v$instance;"
        )?
    ));
    Ok(result)
}

fn tablespaces(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Tablespaces");
    let system = scalar(
        ctx,
        "SELECT status FROM dba_tablespaces WHERE tablespace_name='SYSTEM';",
    )?;
    if system == "ONLINE" {
        result.ok("SYSTEM tablespace online");
    } else {
        result.fail(format!("SYSTEM tablespace {system}"));
    }
    result.ok(format!(
        "Tablespaces: {}",
        scalar(ctx, "SELECT COUNT(*) FROM dba_tablespaces;")?
    ));
    result.ok(format!(
        "Total datafile size: {} GB",
        scalar(ctx, "SELECT ROUND(SUM(bytes)/1024/1024/1024, 2) FROM dba_data_files;")?
    ));
    Ok(result)
}

fn users(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Users");
    for account in ["SYS", "SYSTEM"] {
        let status = scalar(
            ctx,
            &format!("SELECT account_status FROM dba_users WHERE username='{account}';"),
        )?;
        if status == "OPEN" {
            result.ok(format!("{account} user active"));
        } else {
            result.warn(format!("{account} user {status}"));
        }
    }
    result.ok(format!(
        "Total users: {}",
        scalar(ctx, "SELECT COUNT(*) FROM dba_users;")?
    ));
    Ok(result)
}

fn pdb(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("PDB");
    if scalar(ctx, "SELECT cdb FROM v$database;")? == "YES" {
        result.ok("Container database enabled");
        let pdbs = ctx
            .sql()
            .values("SELECT name || ' ' || open_mode FROM v$pdbs WHERE name != 'PDB$SEED';")?;
        result.ok(format!("PDBs configured: {}", pdbs.len()));
        for line in pdbs {
            result.ok(line);
        }
    } else {
        result.warn("Non-CDB database");
    }
    Ok(result)
}

fn archive_mode(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Archive Mode");
    let mode = scalar(ctx, "SELECT log_mode FROM v$database;")?;
    result.ok(format!("Log mode: {mode}"));
    if mode != "ARCHIVELOG" {
        result.warn("Consider enabling ARCHIVELOG mode for production");
    }
    Ok(result)
}

fn backup(ctx: &Context) -> TestResult {
    let mut result = TestResult::new("Backup");
    match ctx.rman("SHOW ALL;") {
        Ok(captured) => {
            result.ok("RMAN accessible");
            if captured.output.contains("CONFIGURE RETENTION POLICY") {
                result.ok("RMAN configuration found");
            }
        }
        Err(err) => result.warn(format!("RMAN connection issue: {err}")),
    }
    result
}

fn performance(ctx: &Context) -> Result<TestResult> {
    let mut result = TestResult::new("Performance");
    result.ok(format!(
        "SGA size: {} MB",
        scalar(ctx, "SELECT ROUND(SUM(value)/1024/1024, 2) FROM v$sga;")?
    ));
    result.ok(format!(
        "PGA allocated: {} MB",
        scalar(
            ctx,
            "SELECT ROUND(value/1024/1024, 2) FROM v$pgastat WHERE name='total PGA allocated';"
        )?
    ));
    result.ok(format!(
        "Sessions: {}",
        scalar(ctx, "SELECT COUNT(*) FROM v$session;")?
    ));
    Ok(result)
}

fn guarded(name: &'static str, check: impl FnOnce() -> Result<TestResult>) -> TestResult {
    check().unwrap_or_else(|err| {
        let mut result = TestResult::new(name);
        result.fail(format!("Error: {err}"));
        result
    })
}

/// Run all eleven checks; a check that errors is recorded as failed.
#[must_use]
pub fn run_all(ctx: &Context) -> SmokeReport {
    let results = vec![
        environment(ctx),
        guarded("Binaries", || binaries(ctx)),
        guarded("Listener", || listener(ctx)),
        guarded("Database", || database(ctx)),
        guarded("Instance", || instance(ctx)),
        guarded("Tablespaces", || tablespaces(ctx)),
        guarded("Users", || users(ctx)),
        guarded("PDB", || pdb(ctx)),
        guarded("Archive Mode", || archive_mode(ctx)),
        backup(ctx),
        guarded("Performance", || performance(ctx)),
    ];
    SmokeReport { results }
}
