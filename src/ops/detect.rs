//! What is installed and running on this host.

use super::Context;
use crate::{error::Result, runner::Invocation};
use serde::Serialize;
use std::{fs, path::Path};

/// Binaries whose presence marks a usable database home.
pub const HOME_BINARIES: [&str; 5] = ["sqlplus", "rman", "lsnrctl", "dbca", "netca"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Processes {
    /// SIDs with a running `ora_pmon_<SID>` background process.
    pub instances: Vec<String>,
    pub listener: bool,
    pub asm: bool,
}

/// Read `ps -eo args` output.
#[must_use]
pub fn parse_processes(ps: &str) -> Processes {
    let mut found = Processes::default();
    for line in ps.lines().map(str::trim) {
        let command = line.split_whitespace().next().unwrap_or_default();
        if let Some(sid) = command
            .strip_prefix("ora_pmon_")
            .filter(|sid| !sid.is_empty() && !found.instances.iter().any(|s| s == sid))
        {
            found.instances.push(sid.to_string());
        } else if command.starts_with("asm_pmon_+ASM") {
            found.asm = true;
        } else if command.ends_with("/tnslsnr") || command == "tnslsnr" {
            found.listener = true;
        }
    }
    found
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub oracle_home: String,
    pub home_exists: bool,
    pub binaries: Vec<(String, bool)>,
    pub grid_home: String,
    pub grid_installed: bool,
    pub processes: Processes,
}

impl Detection {
    #[must_use]
    pub fn binaries_present(&self) -> bool {
        self.binaries.iter().all(|(_, present)| *present)
    }

    /// Human-readable report, one check per line.
    #[must_use]
    pub fn report(&self) -> Vec<String> {
        let mark = |ok: bool| if ok { "✓" } else { "✗" };
        let mut lines = vec![format!(
            "{} ORACLE_HOME: {}",
            mark(self.home_exists),
            self.oracle_home
        )];
        lines.extend(
            self.binaries
                .iter()
                .map(|(name, present)| format!("{} {name}", mark(*present))),
        );
        lines.push(format!(
            "{} Grid Infrastructure: {}",
            mark(self.grid_installed),
            self.grid_home
        ));
        if self.processes.instances.is_empty() {
            lines.push("✗ No running instance".to_string());
        } else {
            lines.push(format!(
                "✓ Running instances: {}",
                self.processes.instances.join(", ")
            ));
        }
        lines.push(format!("{} Listener", mark(self.processes.listener)));
        if self.processes.asm {
            lines.push("✓ ASM instance".to_string());
        }
        lines
    }
}

/// Inspect the configured homes and the process table.
///
/// # Errors
///
/// Returns an error if `ps` cannot be run
pub fn detect(ctx: &Context) -> Result<Detection> {
    let home = ctx.config.oracle_home();
    let grid = Path::new(&ctx.config.oracle.grid_home);
    let ps = ctx
        .executor()
        .capture(&Invocation::new("ps").args(["-eo", "args"]))?;

    Ok(Detection {
        oracle_home: ctx.config.oracle.oracle_home.clone(),
        home_exists: home.is_dir(),
        binaries: HOME_BINARIES
            .iter()
            .map(|name| ((*name).to_string(), home.join("bin").join(name).is_file()))
            .collect(),
        grid_home: ctx.config.oracle.grid_home.clone(),
        grid_installed: grid.join("bin/crsctl").is_file(),
        processes: parse_processes(&ps.output),
    })
}

/// Node name of this host.
#[must_use]
pub fn hostname() -> String {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| fs::read_to_string("/etc/hostname"))
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::{RecordingExecutor, context};
    use std::sync::Arc;

    const PS: &str = "ARGS
/usr/lib/systemd/systemd --switched-root --system
ora_pmon_GDCPROD
ora_smon_GDCPROD
ora_pmon_TESTDB
asm_pmon_+ASM
/u01/app/oracle/product/19.3.0/dbhome_1/bin/tnslsnr LISTENER -inherit
grep ora_pmon_
";

    #[test]
    fn test_parse_processes() {
        let found = parse_processes(PS);
        assert_eq!(found.instances, ["GDCPROD", "TESTDB"]);
        assert!(found.listener);
        assert!(found.asm);
        assert_eq!(parse_processes("bash\n"), Processes::default());
    }

    #[test]
    fn test_detect_with_fake_home() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("dbhome_1");
        fs::create_dir_all(home.join("bin")).unwrap();
        for name in HOME_BINARIES {
            fs::write(home.join("bin").join(name), "").unwrap();
        }

        let exec = Arc::new(RecordingExecutor::default().respond("ps -eo args", 0, PS));
        let mut ctx = context(&exec, dir.path());
        ctx.config.oracle.oracle_home = home.to_string_lossy().into_owned();
        ctx.config.oracle.grid_home = dir.path().join("grid").to_string_lossy().into_owned();

        let detection = detect(&ctx).unwrap();
        assert!(detection.home_exists);
        assert!(detection.binaries_present());
        assert!(!detection.grid_installed);
        let report = detection.report();
        assert!(report.contains(&"✓ Running instances: GDCPROD, TESTDB".to_string()));
        assert!(report.contains(&"✓ Listener".to_string()));
    }
}
