use crate::{
    cli::actions::{
        Action, Asm, DataGuard, Flashback, Install, LogKind, Nfs, Pdb, Protection, Rac, Rman,
        Globals, Security, Source, Storage, Tuning,
    },
    config::Config,
    ops::{install::InstallOptions, labs},
    validation,
};
use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use std::{net::IpAddr, path::PathBuf};

fn string(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing argument: {id}"))
}

fn optional(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn path(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(id)
        .cloned()
        .with_context(|| format!("missing argument: {id}"))
}

/// Load the configuration and apply the global overrides.
///
/// # Errors
///
/// Returns an error if the configuration file is missing or invalid
pub fn globals(matches: &ArgMatches) -> Result<Globals> {
    let file = matches.get_one::<PathBuf>("config");
    let mut config = Config::load(file.map(PathBuf::as_path))
        .context("Failed to load configuration")?;

    if let Some(dir) = matches.get_one::<PathBuf>("log-dir") {
        config = config.with_log_dir(dir.clone());
    }
    if let Some(dir) = matches.get_one::<PathBuf>("scripts-dir") {
        config = config.with_scripts_dir(dir.clone());
    }

    Ok(Globals {
        config,
        verbosity: matches.get_count("verbose"),
    })
}

fn install(matches: &ArgMatches) -> Result<Action> {
    let install = match matches.subcommand() {
        None => Install::All {
            yes: false,
            options: InstallOptions::default(),
        },
        Some(("all", m)) => Install::All {
            yes: m.get_flag("yes"),
            options: InstallOptions {
                skip_system: m.get_flag("skip-system"),
                skip_binaries: m.get_flag("skip-binaries"),
                skip_db: m.get_flag("skip-db"),
            },
        },
        Some(("system", _)) => Install::System,
        Some(("binaries", _)) => Install::Binaries,
        Some(("software", _)) => Install::Software,
        Some(("database", m)) => Install::Database {
            name: optional(m, "name"),
        },
        Some(("check", _)) => Install::Check,
        Some((other, _)) => bail!("unknown install command: {other}"),
    };
    Ok(Action::Install(install))
}

fn lab_topic(matches: &ArgMatches, table: &[(&str, u8)]) -> Result<Action> {
    let topic = string(matches, "topic")?;
    if topic == "all" {
        let first = table.first().map_or(1, |(_, n)| *n);
        let last = table.last().map_or(15, |(_, n)| *n);
        return Ok(Action::LabRange {
            from: first,
            to: last,
            keep_going: false,
        });
    }
    Ok(Action::Lab {
        number: labs::topic(table, &topic)?,
    })
}

fn labs_command(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("list", _)) => Ok(Action::LabsList),
        Some(("run", m)) => Ok(Action::Lab {
            number: validation::lab_number(&string(m, "number")?)?,
        }),
        Some(("run-all", m)) => Ok(Action::LabRange {
            from: validation::lab_number(&string(m, "from")?)?,
            to: validation::lab_number(&string(m, "to")?)?,
            keep_going: m.get_flag("keep-going"),
        }),
        _ => bail!("missing labs command"),
    }
}

fn download(matches: &ArgMatches) -> Result<Action> {
    let source = if let Some(url) = optional(matches, "url") {
        Source::Url(url)
    } else if matches.get_flag("from-drive") {
        Source::Drive
    } else {
        Source::Local
    };
    Ok(Action::Download {
        component: string(matches, "component")?.parse()?,
        source,
        dir: path(matches, "dir")?,
        extract: matches.get_flag("extract"),
    })
}

fn genrsp(matches: &ArgMatches) -> Result<Action> {
    let template = string(matches, "template")?;
    Ok(Action::GenRsp {
        template: if template == "all" {
            None
        } else {
            Some(template.parse()?)
        },
        output: matches.get_one::<PathBuf>("output").cloned(),
        output_dir: path(matches, "output-dir")?,
    })
}

fn rman(matches: &ArgMatches) -> Result<Rman> {
    Ok(match matches.subcommand() {
        Some(("setup", m)) => Rman::Setup {
            retention_days: m.get_one::<u32>("retention").copied().unwrap_or(7),
            compression: !m.get_flag("no-compression"),
        },
        Some(("backup", m)) => Rman::Backup {
            kind: string(m, "type")?.parse()?,
            tag: optional(m, "tag"),
        },
        Some(("restore", m)) => Rman::Restore {
            until: optional(m, "until"),
            yes: m.get_flag("yes"),
        },
        Some(("list", m)) => Rman::List {
            kind: string(m, "type")?.parse()?,
        },
        _ => bail!("missing rman command"),
    })
}

fn dataguard(matches: &ArgMatches) -> Result<DataGuard> {
    Ok(match matches.subcommand() {
        Some(("setup", m)) => DataGuard::Setup {
            primary: string(m, "primary")?,
            standby: string(m, "standby")?,
            db_name: optional(m, "db-name"),
        },
        Some(("status", _)) => DataGuard::Status,
        Some(("switchover", m)) => DataGuard::Switchover {
            target: string(m, "target")?,
        },
        Some(("failover", m)) => DataGuard::Failover {
            target: string(m, "target")?,
            yes: m.get_flag("yes"),
        },
        _ => bail!("missing dataguard command"),
    })
}

fn tuning(matches: &ArgMatches) -> Result<Tuning> {
    let window = |m: &ArgMatches| {
        (
            m.get_one::<u64>("begin").copied(),
            m.get_one::<u64>("end").copied(),
        )
    };
    Ok(match matches.subcommand() {
        Some(("analyze", m)) => Tuning::Analyze {
            deep: m.get_flag("deep"),
        },
        Some(("awr", m)) => {
            let (begin, end) = window(m);
            Tuning::Awr { begin, end }
        }
        Some(("addm", m)) => {
            let (begin, end) = window(m);
            Tuning::Addm { begin, end }
        }
        Some(("sql-trace", m)) => Tuning::SqlTrace {
            sid: m.get_one::<u32>("sid").copied(),
        },
        _ => bail!("missing tuning command"),
    })
}

fn asm(matches: &ArgMatches) -> Result<Asm> {
    Ok(match matches.subcommand() {
        Some(("setup", m)) => Asm::Setup {
            disks: strings(m, "disks"),
        },
        Some(("create-diskgroup", m)) => Asm::CreateDiskgroup {
            name: string(m, "name")?,
            redundancy: string(m, "redundancy")?.parse()?,
            disks: strings(m, "disks"),
        },
        Some(("status", _)) => Asm::Status,
        _ => bail!("missing asm command"),
    })
}

fn rac(matches: &ArgMatches) -> Result<Rac> {
    Ok(match matches.subcommand() {
        Some(("setup", m)) => Rac::Setup {
            nodes: strings(m, "nodes"),
            vips: strings(m, "vips"),
        },
        Some(("add-node", m)) => Rac::AddNode {
            host: string(m, "host")?,
            vip: string(m, "vip")?,
        },
        Some(("status", _)) => Rac::Status,
        _ => bail!("missing rac command"),
    })
}

fn pdb(matches: &ArgMatches) -> Result<Pdb> {
    Ok(match matches.subcommand() {
        Some(("create", m)) => Pdb::Create {
            name: string(m, "name")?,
            admin_user: string(m, "admin-user")?,
            password: optional(m, "password"),
        },
        Some(("clone", m)) => Pdb::Clone {
            source: string(m, "source")?,
            target: string(m, "target")?,
        },
        Some(("list", _)) => Pdb::List,
        Some(("open", m)) => Pdb::Open {
            name: string(m, "name")?,
        },
        Some(("close", m)) => Pdb::Close {
            name: string(m, "name")?,
        },
        Some(("drop", m)) => Pdb::Drop {
            name: string(m, "name")?,
            including_datafiles: !m.get_flag("keep-datafiles"),
            yes: m.get_flag("yes"),
        },
        _ => bail!("missing pdb command"),
    })
}

fn flashback(matches: &ArgMatches) -> Result<Flashback> {
    Ok(match matches.subcommand() {
        Some(("enable", m)) => Flashback::Enable {
            retention_minutes: m
                .get_one::<u32>("retention")
                .copied()
                .unwrap_or(crate::ops::flashback::DEFAULT_RETENTION_MINUTES),
        },
        Some(("disable", _)) => Flashback::Disable,
        Some(("restore", m)) => Flashback::Restore {
            target: string(m, "target")?.parse()?,
            yes: m.get_flag("yes"),
        },
        Some(("table", m)) => Flashback::Table {
            table: string(m, "table")?,
            timestamp: string(m, "timestamp")?,
        },
        Some(("status", _)) => Flashback::Status,
        _ => bail!("missing flashback command"),
    })
}

fn protection(matches: &ArgMatches) -> Result<Protection> {
    Ok(match matches.subcommand() {
        Some(("archivelog", m)) => Protection::Archivelog {
            enable: m.get_flag("enable"),
        },
        Some(("fra", m)) => Protection::Fra {
            size: optional(m, "size"),
            dest: optional(m, "dest"),
        },
        _ => bail!("missing protection command"),
    })
}

fn security(matches: &ArgMatches) -> Result<Security> {
    Ok(match matches.subcommand() {
        Some(("audit", m)) => Security::Audit {
            enable: !m.get_flag("disable"),
        },
        Some(("audit-trail", _)) => Security::AuditTrail,
        Some(("tde", m)) => Security::Tde {
            password: optional(m, "password"),
        },
        Some(("users", m)) => {
            if let Some(name) = optional(m, "create") {
                Security::CreateUser {
                    name,
                    password: optional(m, "password"),
                    tablespace: string(m, "tablespace")?,
                    profile: string(m, "profile")?,
                }
            } else if let Some(name) = optional(m, "drop") {
                Security::DropUser {
                    name,
                    yes: m.get_flag("yes"),
                }
            } else {
                Security::Users
            }
        }
        Some(("lock", m)) => Security::Lock {
            user: string(m, "user")?,
        },
        Some(("unlock", m)) => Security::Unlock {
            user: string(m, "user")?,
        },
        Some(("grant", m)) => Security::Grant {
            privilege: string(m, "privilege")?,
            user: string(m, "user")?,
        },
        Some(("profile", m)) => Security::Profile {
            name: string(m, "name")?,
        },
        _ => bail!("missing security command"),
    })
}

fn nfs(matches: &ArgMatches) -> Result<Nfs> {
    Ok(match matches.subcommand() {
        Some(("setup-server", m)) => Nfs::SetupServer {
            path: string(m, "path")?,
            clients: strings(m, "clients"),
        },
        Some(("setup-client", m)) => Nfs::SetupClient {
            server: string(m, "server")?,
            remote: string(m, "remote")?,
            mount_point: string(m, "mount-point")?,
        },
        Some(("mount", m)) => Nfs::Mount {
            server: string(m, "server")?,
            remote: string(m, "remote")?,
            mount_point: string(m, "mount-point")?,
        },
        Some(("share", m)) => Nfs::Share {
            dir: string(m, "dir")?,
            clients: strings(m, "clients"),
        },
        _ => bail!("missing nfs command"),
    })
}

fn storage(matches: &ArgMatches) -> Result<Storage> {
    Ok(match matches.subcommand() {
        Some(("tablespaces", _)) => Storage::Tablespaces,
        Some(("create-tablespace", m)) => Storage::CreateTablespace {
            name: string(m, "name")?,
            size: string(m, "size")?,
            autoextend: !m.get_flag("no-autoextend"),
        },
        Some(("drop-tablespace", m)) => Storage::DropTablespace {
            name: string(m, "name")?,
            yes: m.get_flag("yes"),
        },
        Some(("redo-add", m)) => Storage::RedoAdd {
            size: string(m, "size")?,
        },
        _ => bail!("missing storage command"),
    })
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if a value cannot be parsed into its domain type
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    let Some((name, m)) = matches.subcommand() else {
        bail!("no command given, see --help");
    };

    Ok(match name {
        "install" => install(m)?,
        "configure" => lab_topic(m, labs::CONFIGURE)?,
        "maintenance" => lab_topic(m, labs::MAINTENANCE)?,
        "advanced" => lab_topic(m, labs::ADVANCED)?,
        "labs" => labs_command(m)?,
        "vm-init" => Action::VmInit {
            role: string(m, "role")?.parse()?,
            node: m.get_one::<u8>("node-number").copied(),
        },
        "precheck" => Action::Precheck {
            fix: if m.get_flag("fix") {
                Some(path(m, "output")?)
            } else {
                None
            },
        },
        "test" => Action::Test {
            report: m.get_flag("report"),
        },
        "download" => download(m)?,
        "genrsp" => genrsp(m)?,
        "rman" => Action::Rman(rman(m)?),
        "dataguard" => Action::DataGuard(dataguard(m)?),
        "tuning" => Action::Tuning(tuning(m)?),
        "asm" => Action::Asm(asm(m)?),
        "rac" => Action::Rac(rac(m)?),
        "pdb" => Action::Pdb(pdb(m)?),
        "flashback" => Action::Flashback(flashback(m)?),
        "protection" => Action::Protection(protection(m)?),
        "security" => Action::Security(security(m)?),
        "nfs" => Action::Nfs(nfs(m)?),
        "status" => Action::Status,
        "start" => Action::Start,
        "stop" => Action::Stop,
        "restart" => Action::Restart,
        "sqlplus" => Action::SqlPlus {
            pdb: optional(m, "pdb"),
        },
        "exec" => Action::Exec {
            script: path(m, "script")?,
        },
        "logs" => Action::Logs {
            log: if string(m, "log")? == "listener" {
                LogKind::Listener
            } else {
                LogKind::Alert
            },
            tail: m
                .get_one::<usize>("tail")
                .copied()
                .unwrap_or(crate::ops::database::DEFAULT_TAIL_LINES),
        },
        "monitor" => {
            if string(m, "what")? == "sessions" {
                Action::MonitorSessions {
                    active_only: m.get_flag("active-only"),
                }
            } else {
                Action::MonitorTablespaces
            }
        }
        "storage" => Action::Storage(storage(m)?),
        "web" => Action::Web {
            listen: m.get_one::<IpAddr>("listen").copied(),
            port: m.get_one::<u16>("port").copied(),
            state_dir: m.get_one::<PathBuf>("state-dir").cloned(),
        },
        other => bail!("unknown command: {other}"),
    })
}
