mod run;

pub use run::Globals;

use crate::{
    ops::{
        asm::Redundancy,
        download::Component,
        flashback::Target,
        install::{InstallOptions, VmRole},
        rman::{BackupKind, ListKind},
    },
    response_files::Template,
};
use std::{net::IpAddr, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Install {
    All { yes: bool, options: InstallOptions },
    System,
    Binaries,
    Software,
    Database { name: Option<String> },
    Check,
}

/// Where `download` gets the archive from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    Drive,
    /// Already placed in the download directory by hand.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rman {
    Setup { retention_days: u32, compression: bool },
    Backup { kind: BackupKind, tag: Option<String> },
    Restore { until: Option<String>, yes: bool },
    List { kind: ListKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataGuard {
    Setup { primary: String, standby: String, db_name: Option<String> },
    Status,
    Switchover { target: String },
    Failover { target: String, yes: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tuning {
    Analyze { deep: bool },
    Awr { begin: Option<u64>, end: Option<u64> },
    Addm { begin: Option<u64>, end: Option<u64> },
    SqlTrace { sid: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asm {
    Setup { disks: Vec<String> },
    CreateDiskgroup { name: String, redundancy: Redundancy, disks: Vec<String> },
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rac {
    Setup { nodes: Vec<String>, vips: Vec<String> },
    AddNode { host: String, vip: String },
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdb {
    Create { name: String, admin_user: String, password: Option<String> },
    Clone { source: String, target: String },
    List,
    Open { name: String },
    Close { name: String },
    Drop { name: String, including_datafiles: bool, yes: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flashback {
    Enable { retention_minutes: u32 },
    Disable,
    Restore { target: Target, yes: bool },
    Table { table: String, timestamp: String },
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protection {
    Archivelog { enable: bool },
    /// Shows the current setting when neither value is given.
    Fra { size: Option<String>, dest: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Security {
    Audit { enable: bool },
    AuditTrail,
    Tde { password: Option<String> },
    Users,
    CreateUser {
        name: String,
        password: Option<String>,
        tablespace: String,
        profile: String,
    },
    DropUser { name: String, yes: bool },
    Lock { user: String },
    Unlock { user: String },
    Grant { privilege: String, user: String },
    Profile { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nfs {
    SetupServer { path: String, clients: Vec<String> },
    SetupClient { server: String, remote: String, mount_point: String },
    Mount { server: String, remote: String, mount_point: String },
    Share { dir: String, clients: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Tablespaces,
    CreateTablespace { name: String, size: String, autoextend: bool },
    DropTablespace { name: String, yes: bool },
    RedoAdd { size: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Alert,
    Listener,
}

/// Action enum representing each possible command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Install(Install),
    Lab { number: u8 },
    LabRange { from: u8, to: u8, keep_going: bool },
    LabsList,
    VmInit { role: VmRole, node: Option<u8> },
    Precheck { fix: Option<PathBuf> },
    Test { report: bool },
    Download {
        component: Component,
        source: Source,
        dir: PathBuf,
        extract: bool,
    },
    GenRsp {
        /// Every template when `None`.
        template: Option<Template>,
        output: Option<PathBuf>,
        output_dir: PathBuf,
    },
    Rman(Rman),
    DataGuard(DataGuard),
    Tuning(Tuning),
    Asm(Asm),
    Rac(Rac),
    Pdb(Pdb),
    Flashback(Flashback),
    Protection(Protection),
    Security(Security),
    Nfs(Nfs),
    Status,
    Start,
    Stop,
    Restart,
    SqlPlus { pdb: Option<String> },
    Exec { script: PathBuf },
    Logs { log: LogKind, tail: usize },
    MonitorTablespaces,
    MonitorSessions { active_only: bool },
    Storage(Storage),
    Web {
        listen: Option<IpAddr>,
        port: Option<u16>,
        state_dir: Option<PathBuf>,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self, globals: Globals) -> anyhow::Result<()> {
        run::execute(self, globals).await
    }

    /// Label used for operation metrics and logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Lab { .. } | Self::LabRange { .. } | Self::LabsList => "labs",
            Self::VmInit { .. } => "vm_init",
            Self::Precheck { .. } => "precheck",
            Self::Test { .. } => "smoke_test",
            Self::Download { .. } => "download",
            Self::GenRsp { .. } => "genrsp",
            Self::Rman(_) => "rman",
            Self::DataGuard(_) => "dataguard",
            Self::Tuning(_) => "tuning",
            Self::Asm(_) => "asm",
            Self::Rac(_) => "rac",
            Self::Pdb(_) => "pdb",
            Self::Flashback(_) => "flashback",
            Self::Protection(_) => "protection",
            Self::Security(_) => "security",
            Self::Nfs(_) => "nfs",
            Self::Status | Self::Start | Self::Stop | Self::Restart => "database",
            Self::SqlPlus { .. } => "sqlplus",
            Self::Exec { .. } => "exec",
            Self::Logs { .. } => "logs",
            Self::MonitorTablespaces | Self::MonitorSessions { .. } => "monitor",
            Self::Storage(_) => "storage",
            Self::Web { .. } => "web",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_action_debug() {
        let action = Action::Pdb(Pdb::Open {
            name: "GDCPDB".to_string(),
        });
        let debug_str = format!("{action:?}");
        assert!(debug_str.contains("Open"));
        assert!(debug_str.contains("GDCPDB"));
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(Action::Restart.operation(), "database");
        assert_eq!(Action::LabsList.operation(), "labs");
        assert_eq!(
            Action::Storage(Storage::RedoAdd {
                size: "200M".to_string()
            })
            .operation(),
            "storage"
        );
    }
}
