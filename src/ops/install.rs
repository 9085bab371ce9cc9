//! One-command installation of Oracle Database 19c.
//!
//! The plan is built as data first ([`build_plan`]) and then executed by the
//! sequencer, so the same steps back the CLI and the web jobs.

use super::{Context, Outcome, detect, labs};
use crate::{
    error::{Error, Result},
    response_files::{self, Template},
    runner::{
        Invocation, SuccessCheck,
        check::{DBCA, RUN_INSTALLER},
    },
    sequencer::{Confirm, Plan, PlanReport, Step, execute_plan},
    validation,
};
use std::{env, io::Write, str::FromStr, time::Duration};

/// DBCA gives up after half an hour.
pub const DBCA_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub skip_system: bool,
    pub skip_binaries: bool,
    pub skip_db: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    SystemReadiness,
    BinaryInstallation,
    SoftwareInstallation,
    DatabaseCreation,
}

impl InstallStep {
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::SystemReadiness => "System Readiness",
            Self::BinaryInstallation => "Binary Installation",
            Self::SoftwareInstallation => "Software Installation",
            Self::DatabaseCreation => "Database Creation",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SystemReadiness => "Configure system (users, groups, kernel params, packages)",
            Self::BinaryInstallation => "Download and extract Oracle 19c binaries (3GB)",
            Self::SoftwareInstallation => "Install Oracle software (runInstaller)",
            Self::DatabaseCreation => "Create the database with DBCA",
        }
    }

    #[must_use]
    pub const fn duration(self) -> &'static str {
        match self {
            Self::SystemReadiness | Self::BinaryInstallation => "5-10 min",
            Self::SoftwareInstallation | Self::DatabaseCreation => "10-15 min",
        }
    }

    /// # Errors
    ///
    /// Whatever the underlying operation returns
    pub fn run(self, ctx: &Context) -> Result<Outcome> {
        match self {
            Self::SystemReadiness => install_system(ctx),
            Self::BinaryInstallation => install_binaries(ctx),
            Self::SoftwareInstallation => install_software(ctx),
            Self::DatabaseCreation => create_database(ctx),
        }
    }
}

#[must_use]
pub fn build_plan(options: &InstallOptions) -> Vec<InstallStep> {
    let mut steps = Vec::with_capacity(4);
    if !options.skip_system {
        steps.push(InstallStep::SystemReadiness);
    }
    if !options.skip_binaries {
        steps.push(InstallStep::BinaryInstallation);
        steps.push(InstallStep::SoftwareInstallation);
    }
    if !options.skip_db {
        steps.push(InstallStep::DatabaseCreation);
    }
    steps
}

/// Lab 01 as root.
///
/// # Errors
///
/// Returns `ScriptMissing` or `ToolFailed`
pub fn install_system(ctx: &Context) -> Result<Outcome> {
    labs::run_lab(ctx, 1, &[])
}

/// Lab 02 as the Oracle user.
///
/// # Errors
///
/// Returns `ScriptMissing` or `ToolFailed`
pub fn install_binaries(ctx: &Context) -> Result<Outcome> {
    labs::run_lab(ctx, 2, &[])
}

/// Silent `runInstaller` followed by the two root scripts.
///
/// # Errors
///
/// Returns `ToolFailed` if the installer never reports success or a root
/// script exits non-zero
pub fn install_software(ctx: &Context) -> Result<Outcome> {
    let config = &ctx.config;
    let rsp = response_files::write(
        Template::DbInstall,
        config,
        &env::temp_dir().join("db_install.rsp"),
    )?;

    let installer = ctx
        .as_oracle(&format!("{}/runInstaller", config.oracle.oracle_home))
        .current_dir(config.oracle_home())
        .args(["-silent", "-responseFile"])
        .arg(rsp.to_string_lossy())
        .args(["-waitforcompletion", "-ignorePrereq"]);
    ctx.logged(&installer, "runInstaller", RUN_INSTALLER)?;

    for script in [
        format!("{}/orainstRoot.sh", config.oracle.inventory_location),
        format!("{}/root.sh", config.oracle.oracle_home),
    ] {
        let invocation = Invocation::new(script).envs(config.oracle_env());
        ctx.logged(&invocation, "root_scripts", SuccessCheck::ExitCode)?;
    }

    Ok(Outcome::new(format!(
        "Oracle software installed in {}",
        config.oracle.oracle_home
    )))
}

/// Listener on TCP 1521 and IPC, statically registering the configured SID.
#[must_use]
pub fn listener_ora(ctx: &Context) -> String {
    let oracle = &ctx.config.oracle;
    let database = &ctx.config.database;
    format!(
        "LISTENER =
  (DESCRIPTION_LIST =
    (DESCRIPTION =
      (ADDRESS = (PROTOCOL = TCP)(HOST = 0.0.0.0)(PORT = 1521))
      (ADDRESS = (PROTOCOL = IPC)(KEY = EXTPROC1521))
    )
  )

SID_LIST_LISTENER =
  (SID_LIST =
    (SID_DESC =
      (GLOBAL_DBNAME = {})
      (ORACLE_HOME = {})
      (SID_NAME = {})
    )
  )

ADR_BASE_LISTENER = {}
",
        database.db_name, oracle.oracle_home, database.sid, oracle.oracle_base
    )
}

fn write_listener_ora(ctx: &Context) -> Result<()> {
    let admin = format!("{}/network/admin", ctx.config.oracle.oracle_home);
    let exec = ctx.executor();

    let mkdir = exec.capture(&ctx.as_oracle("mkdir").args(["-p", admin.as_str()]))?;
    SuccessCheck::ExitCode.require(mkdir, "mkdir", None)?;

    let tee = ctx
        .as_oracle("tee")
        .arg(format!("{admin}/listener.ora"))
        .stdin(listener_ora(ctx));
    SuccessCheck::ExitCode.require(exec.capture(&tee)?, "tee", None)?;
    Ok(())
}

/// `dbca -silent -createDatabase` argument list.
#[must_use]
pub fn dbca_args(ctx: &Context) -> Vec<String> {
    let db = &ctx.config.database;
    let datafiles = format!("{}/oradata", ctx.config.oracle.oracle_base);
    let recovery = format!("{}/fast_recovery_area", ctx.config.oracle.oracle_base);

    let mut args = vec!["-silent".to_string(), "-createDatabase".to_string()];
    for (flag, value) in [
        ("-gdbName", db.db_name.as_str()),
        ("-sid", db.sid.as_str()),
        ("-createAsContainerDatabase", "true"),
        ("-numberOfPDBs", "1"),
        ("-pdbName", db.pdb_name.as_str()),
        ("-sysPassword", db.sys_password.as_str()),
        ("-systemPassword", db.sys_password.as_str()),
        ("-pdbAdminPassword", db.sys_password.as_str()),
        ("-datafileDestination", datafiles.as_str()),
        ("-recoveryAreaDestination", recovery.as_str()),
        ("-storageType", "FS"),
        ("-characterSet", "AL32UTF8"),
        ("-nationalCharacterSet", "AL16UTF16"),
        ("-memoryPercentage", "40"),
        ("-emConfiguration", "NONE"),
    ] {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
    args
}

/// Listener, DBCA, then a quick look at `v$database` and `v$pdbs`.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad database name, SID or PDB name before
/// anything runs, `ToolFailed` or `Timeout` from DBCA; listener problems are
/// logged and skipped
pub fn create_database(ctx: &Context) -> Result<Outcome> {
    let db = &ctx.config.database;
    validation::identifier("database name", &db.db_name)?;
    validation::identifier("SID", &db.sid)?;
    validation::pdb_name(&db.pdb_name)?;

    if let Err(err) = write_listener_ora(ctx) {
        tracing::warn!(error = %err, "could not write listener.ora");
    }

    let lsnrctl = ctx.oracle_tool("lsnrctl").arg("start");
    match ctx.logged(&lsnrctl, "lsnrctl", SuccessCheck::ExitCode) {
        Ok(_) => tracing::info!("listener started"),
        Err(err) => tracing::warn!(error = %err, "listener start had issues, continuing"),
    }

    let dbca = ctx
        .oracle_tool("dbca")
        .args(dbca_args(ctx))
        .timeout(DBCA_TIMEOUT);
    ctx.logged(&dbca, "dbca", DBCA)?;

    // DBCA already reported success; a failed look at the views does not undo it.
    let verified = match verify_database(ctx) {
        Ok(lines) => lines.join("\n"),
        Err(err) => {
            tracing::warn!(error = %err, "database verification failed");
            format!("Verification failed: {err}")
        }
    };
    Ok(Outcome::new(format!(
        "Database {} created",
        ctx.config.database.db_name
    ))
    .with_output(verified))
}

/// `DB: <name> - <mode>` and one `PDB:` line per pluggable database.
///
/// # Errors
///
/// Returns `ToolFailed` if the queries fail
pub fn verify_database(ctx: &Context) -> Result<Vec<String>> {
    ctx.sql().values(
        "SELECT 'DB: ' || name || ' - ' || open_mode FROM v$database;\n\
         SELECT 'PDB: ' || name || ' - ' || open_mode FROM v$pdbs WHERE name != 'PDB$SEED';",
    )
}

/// Connection instructions printed after a successful installation.
#[must_use]
pub fn closing_lines(ctx: &Context) -> Vec<String> {
    let db = &ctx.config.database;
    vec![
        String::new(),
        "Database Information:".to_string(),
        format!("  • Database Name: {}", db.db_name),
        format!("  • SID: {}", db.sid),
        format!("  • PDB Name: {}", db.pdb_name),
        format!("  • ORACLE_HOME: {}", ctx.config.oracle.oracle_home),
        String::new(),
        "Login with:".to_string(),
        "  sqlplus / as sysdba".to_string(),
        format!(
            "  sqlplus sys/{}@//localhost/{} as sysdba",
            db.sys_password, db.pdb_name
        ),
    ]
}

/// Show, confirm and run the installation plan.
///
/// # Errors
///
/// Only write failures on `out`; step failures are in the report
pub fn install_all(
    ctx: &Context,
    options: &InstallOptions,
    confirm: &mut dyn Confirm,
    out: &mut dyn Write,
) -> Result<PlanReport> {
    let mut plan = Plan::new("Installation").closing(closing_lines(ctx));
    for step in build_plan(options) {
        plan = plan.step(
            Step::new(step.title(), move || step.run(ctx).map(|_| ()))
                .description(step.description())
                .duration_hint(step.duration()),
        );
    }
    execute_plan(plan, confirm, out)
}

/// Home, binaries, instances and listener as found on this host.
///
/// # Errors
///
/// Returns an error if the process table cannot be read
pub fn check_installation(ctx: &Context) -> Result<Outcome> {
    let detection = detect::detect(ctx)?;
    let summary = if detection.home_exists && detection.binaries_present() {
        "Oracle software is installed"
    } else {
        "Oracle software is not installed"
    };
    Ok(Outcome::new(summary).with_output(detection.report().join("\n")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmRole {
    Database,
    RacNode,
    DataguardStandby,
}

impl FromStr for VmRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "database" => Ok(Self::Database),
            "rac-node" => Ok(Self::RacNode),
            "dataguard-standby" => Ok(Self::DataguardStandby),
            _ => Err(Error::invalid(
                "role",
                s,
                "expected database, rac-node or dataguard-standby",
            )),
        }
    }
}

/// Prepare a fresh VM for its role; the database role runs the full plan
/// without asking.
///
/// # Errors
///
/// Returns the failing step or lab error
pub fn vm_init(
    ctx: &Context,
    role: VmRole,
    node: Option<u8>,
    out: &mut dyn Write,
) -> Result<Outcome> {
    match role {
        VmRole::Database => {
            let report = install_all(
                ctx,
                &InstallOptions::default(),
                &mut crate::sequencer::AutoConfirm,
                out,
            )?
            .into_result()?;
            Ok(Outcome::new(format!(
                "Database VM ready after {} steps",
                report.records.len()
            )))
        }
        VmRole::RacNode => {
            let node = node.unwrap_or(1);
            labs::run_lab(ctx, 15, &[("RAC_NODE_NUMBER", node.to_string())])
        }
        VmRole::DataguardStandby => labs::run_lab(ctx, 9, &[("DG_ROLE", "standby".to_string())]),
    }
}
