#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{ScriptedExecutor, Workspace};
use oradba::{
    Error,
    ops::{
        Context,
        install::{self, InstallOptions},
    },
    runner::Echo,
    sequencer::{AutoConfirm, Confirm, Decision, Plan, PlanStatus},
};
use std::sync::Arc;

fn context(workspace: &Workspace, exec: &Arc<ScriptedExecutor>) -> Context {
    Context::new(workspace.config(), exec.clone()).with_echo(Echo::Silent)
}

struct Decline;

impl Confirm for Decline {
    fn confirm(&mut self, _plan: &Plan<'_>) -> Decision {
        Decision::Cancel
    }
}

#[test]
fn test_full_installation() {
    let workspace = Workspace::create();
    workspace.script("tp01-system-readiness.sh");
    workspace.script("tp02-installation-binaire.sh");
    let exec = Arc::new(
        ScriptedExecutor::new()
            .on("runInstaller", 6, "Successfully Setup Software with warning(s).\n")
            .on("dbca", 0, "Prepare for db operation\n100% complete\n")
            .on("v$database", 0, "DB: GDCPROD - READ WRITE\nPDB: GDCPDB - READ WRITE\n"),
    );
    let ctx = context(&workspace, &exec);

    let mut out = Vec::new();
    let report = install::install_all(
        &ctx,
        &InstallOptions::default(),
        &mut AutoConfirm,
        &mut out,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(report.status, PlanStatus::Succeeded);
    assert_eq!(report.records.len(), 4);
    assert!(text.contains("Step 1/4: System Readiness"));
    assert!(text.contains("Step 4/4: Database Creation"));
    assert!(text.contains("Installation Complete"));
    assert!(text.contains("Database Name: GDCPROD"));

    let calls = exec.calls();
    let position = |needle: &str| {
        calls
            .iter()
            .position(|line| line.contains(needle))
            .unwrap_or_else(|| panic!("{needle} never ran: {calls:?}"))
    };
    assert!(position("tp01-system-readiness.sh") < position("tp02-installation-binaire.sh"));
    assert!(position("tp02-installation-binaire.sh") < position("runInstaller"));
    assert!(position("runInstaller") < position("orainstRoot.sh"));
    assert!(position("orainstRoot.sh") < position("dbhome_1/root.sh"));
    assert!(position("lsnrctl start") < position("dbca -silent -createDatabase"));

    assert!(workspace.path("logs").join("dbca.log").is_file());
}

#[test]
fn test_missing_script_stops_the_plan() {
    let workspace = Workspace::create();
    let exec = Arc::new(ScriptedExecutor::new());
    let ctx = context(&workspace, &exec);

    let mut out = Vec::new();
    let report = install::install_all(
        &ctx,
        &InstallOptions::default(),
        &mut AutoConfirm,
        &mut out,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(report.status, PlanStatus::Failed);
    assert_eq!(report.failed_step().unwrap().title, "System Readiness");
    assert!(text.contains("Step 1 FAILED: System Readiness"));
    assert!(text.contains("remaining steps were not run"));
    assert!(!text.contains("Step 2/4"));
    assert!(exec.calls().is_empty());

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, Error::PlanFailed { ref step } if step == "System Readiness"));
}

#[test]
fn test_missing_binaries_script() {
    let workspace = Workspace::create();
    let exec = Arc::new(ScriptedExecutor::new());
    let ctx = context(&workspace, &exec);

    let mut out = Vec::new();
    let options = InstallOptions {
        skip_system: true,
        skip_binaries: false,
        skip_db: true,
    };
    let report = install::install_all(&ctx, &options, &mut AutoConfirm, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(report.status, PlanStatus::Failed);
    let failed = report.failed_step().unwrap();
    assert_eq!(failed.title, "Binary Installation");
    assert!(failed.error.as_deref().unwrap().contains("script not found"));
    assert!(text.contains("Step 1/2: Binary Installation"));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_installer_failure_surfaces_excerpt() {
    let workspace = Workspace::create();
    workspace.script("tp02-installation-binaire.sh");
    let exec = Arc::new(ScriptedExecutor::new().on(
        "runInstaller",
        254,
        "[FATAL] [INS-35179] Current selected Oracle home is not empty.\n",
    ));
    let ctx = context(&workspace, &exec);

    let mut out = Vec::new();
    let options = InstallOptions {
        skip_system: true,
        skip_binaries: false,
        skip_db: true,
    };
    let report = install::install_all(&ctx, &options, &mut AutoConfirm, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    let failed = report.failed_step().unwrap();
    assert_eq!(failed.title, "Software Installation");
    assert_eq!(
        failed.log.as_deref(),
        Some(workspace.path("logs").join("runInstaller.log").as_path())
    );
    assert!(text.contains("INS-35179"));
    assert!(exec.calls().iter().all(|line| !line.contains("root.sh")));
}

#[test]
fn test_declined_plan_runs_nothing() {
    let workspace = Workspace::create();
    workspace.script("tp01-system-readiness.sh");
    let exec = Arc::new(ScriptedExecutor::new());
    let ctx = context(&workspace, &exec);

    let mut out = Vec::new();
    let report =
        install::install_all(&ctx, &InstallOptions::default(), &mut Decline, &mut out).unwrap();

    assert_eq!(report.status, PlanStatus::Cancelled);
    assert!(String::from_utf8(out).unwrap().contains("Installation cancelled by user"));
    assert!(exec.calls().is_empty());
    assert!(matches!(report.into_result(), Err(Error::Cancelled)));
}
