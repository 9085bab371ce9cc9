//! Provisioning scripts `tp01`..`tp15` shipped in the scripts directory.

use super::{Context, Outcome};
use crate::{
    error::{Error, Result},
    runner::{Invocation, SuccessCheck},
    validation,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunAs {
    Root,
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lab {
    pub number: u8,
    pub script: &'static str,
    pub user: RunAs,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub duration: &'static str,
}

const fn lab(
    number: u8,
    script: &'static str,
    user: RunAs,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    duration: &'static str,
) -> Lab {
    Lab {
        number,
        script,
        user,
        name,
        description,
        category,
        duration,
    }
}

pub const LABS: [Lab; 15] = [
    lab(1, "tp01-system-readiness.sh", RunAs::Root, "System Readiness", "User, groups, packages, kernel params", "Installation", "5-10 min"),
    lab(2, "tp02-installation-binaire.sh", RunAs::Oracle, "Binary Installation", "Download and extract Oracle 19c", "Installation", "5-10 min"),
    lab(3, "tp03-creation-instance.sh", RunAs::Oracle, "Database Creation", "Create database with DBCA", "Installation", "10-15 min"),
    lab(4, "tp04-fichiers-critiques.sh", RunAs::Oracle, "Critical Files", "Multiplex control files, redo logs", "Configuration", "2-5 min"),
    lab(5, "tp05-gestion-stockage.sh", RunAs::Oracle, "Storage Management", "Tablespaces, datafiles, OMF", "Configuration", "2-5 min"),
    lab(6, "tp06-securite-acces.sh", RunAs::Oracle, "Security", "Users, roles, profiles, privileges", "Security", "2-5 min"),
    lab(7, "tp07-flashback.sh", RunAs::Oracle, "Flashback", "Flashback query, table, database", "Protection", "5 min"),
    lab(8, "tp08-rman.sh", RunAs::Oracle, "RMAN Backup", "Backup strategies and recovery", "Protection", "10-20 min"),
    lab(9, "tp09-dataguard.sh", RunAs::Oracle, "Data Guard", "High availability with standby", "HA", "15-30 min"),
    lab(10, "tp10-tuning.sh", RunAs::Oracle, "Performance Tuning", "AWR, SQL tuning, optimization", "Performance", "5-10 min"),
    lab(11, "tp11-patching.sh", RunAs::Oracle, "Patching", "Apply patches and updates", "Maintenance", "10-30 min"),
    lab(12, "tp12-multitenant.sh", RunAs::Oracle, "Multitenant", "CDB/PDB management", "Architecture", "5-10 min"),
    lab(13, "tp13-ai-foundations.sh", RunAs::Oracle, "AI/ML", "Oracle Machine Learning", "Advanced", "5-10 min"),
    lab(14, "tp14-mobilite-concurrence.sh", RunAs::Oracle, "Data Mobility", "Data Pump, transportable tablespaces", "Advanced", "5-10 min"),
    lab(15, "tp15-asm-rac-concepts.sh", RunAs::Oracle, "ASM/RAC", "Clustering and ASM concepts", "Advanced", "5-10 min"),
];

/// `oradba configure <topic>`.
pub const CONFIGURE: &[(&str, u8)] = &[
    ("multiplexing", 4),
    ("storage", 5),
    ("users", 6),
    ("flashback", 7),
    ("backup", 8),
    ("dataguard", 9),
];

/// `oradba maintenance <topic>`.
pub const MAINTENANCE: &[(&str, u8)] = &[("tune", 10), ("patch", 11)];

/// `oradba advanced <topic>`.
pub const ADVANCED: &[(&str, u8)] = &[
    ("multitenant", 12),
    ("ai-ml", 13),
    ("data-mobility", 14),
    ("asm-rac", 15),
];

/// Lab number registered for `topic` in one of the group tables.
///
/// # Errors
///
/// Returns `InvalidInput` for an unknown topic
pub fn topic(table: &[(&str, u8)], name: &str) -> Result<u8> {
    table
        .iter()
        .find(|(topic, _)| *topic == name)
        .map(|(_, number)| *number)
        .ok_or_else(|| Error::invalid("topic", name, "not a known lab topic"))
}

/// # Errors
///
/// Returns `InvalidInput` outside 1..=15
pub fn find(number: u8) -> Result<&'static Lab> {
    LABS.iter()
        .find(|lab| lab.number == number)
        .ok_or_else(|| Error::invalid("lab number", number.to_string(), "must be 01 to 15"))
}

#[must_use]
pub fn script_path(ctx: &Context, lab: &Lab) -> PathBuf {
    ctx.config.paths.scripts_dir.join(lab.script)
}

/// Run one lab with `env` added to the Oracle environment.
///
/// Output is teed to `<log_dir>/<script>.log`.
///
/// # Errors
///
/// Returns `ScriptMissing` if the script is absent and `ToolFailed` on a
/// non-zero exit
pub fn run_lab(ctx: &Context, number: u8, env: &[(&str, String)]) -> Result<Outcome> {
    let lab = find(number)?;
    let path = script_path(ctx, lab);
    if !path.is_file() {
        return Err(Error::ScriptMissing(path));
    }

    let mut invocation = Invocation::new("bash")
        .arg(path.to_string_lossy())
        .envs(ctx.config.oracle_env())
        .envs(
            env.iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        );
    if lab.user == RunAs::Oracle {
        invocation = invocation.as_user(&ctx.config.oracle.os_user);
    }

    tracing::info!(lab = lab.number, script = lab.script, "running lab");
    let captured = ctx.logged(&invocation, lab.script, SuccessCheck::ExitCode)?;

    Ok(
        Outcome::new(format!("Lab {:02} {} completed", lab.number, lab.name))
            .with_output(captured.output),
    )
}

/// Parse `NN` and run that lab.
///
/// # Errors
///
/// Returns `InvalidInput` for a malformed number, otherwise as [`run_lab`]
pub fn run_lab_str(ctx: &Context, number: &str) -> Result<Outcome> {
    run_lab(ctx, validation::lab_number(number)?, &[])
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabSummary {
    pub completed: Vec<u8>,
    pub failed: Vec<u8>,
}

impl LabSummary {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run labs `from..=to` in order.
///
/// After a failure `keep_going` decides whether to continue; without it the
/// run stops at the first failure.
///
/// # Errors
///
/// Returns `InvalidInput` for an empty or out-of-range window
pub fn run_labs(
    ctx: &Context,
    from: u8,
    to: u8,
    keep_going: &mut dyn FnMut(u8, &Error) -> bool,
) -> Result<LabSummary> {
    find(from)?;
    find(to)?;
    if from > to {
        return Err(Error::invalid(
            "lab range",
            format!("{from:02}-{to:02}"),
            "start must not be after end",
        ));
    }

    let mut summary = LabSummary::default();
    for number in from..=to {
        match run_lab(ctx, number, &[]) {
            Ok(_) => summary.completed.push(number),
            Err(err) => {
                tracing::error!(lab = number, error = %err, "lab failed");
                summary.failed.push(number);
                if !keep_going(number, &err) {
                    break;
                }
            }
        }
    }
    Ok(summary)
}
