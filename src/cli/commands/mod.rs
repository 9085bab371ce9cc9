use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
    value_parser,
};
use std::{net::IpAddr, path::PathBuf};

fn yes() -> Arg {
    Arg::new("yes")
        .help("Do not ask for confirmation")
        .long("yes")
        .short('y')
        .action(ArgAction::SetTrue)
}

fn flag(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).help(help).long(id).action(ArgAction::SetTrue)
}

fn positional(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).help(help).required(true)
}

fn password(env: &'static str) -> Arg {
    Arg::new("password")
        .env(env)
        .help("Password (prompted for when omitted)")
        .long("password")
        .hide_env_values(true)
}

fn list(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .help(help)
        .long(id)
        .value_delimiter(',')
        .num_args(1..)
}

fn install() -> Command {
    Command::new("install")
        .about("Install Oracle 19c (runs `all` when no subcommand is given)")
        .subcommand(
            Command::new("all")
                .about("System readiness, binaries, software and database")
                .arg(yes())
                .arg(flag("skip-system", "Skip system preparation"))
                .arg(flag("skip-binaries", "Skip binary download and software installation"))
                .arg(flag("skip-db", "Skip database creation")),
        )
        .subcommand(Command::new("system").about("Prepare the operating system (lab 01, root)"))
        .subcommand(Command::new("binaries").about("Download and extract the binaries (lab 02)"))
        .subcommand(Command::new("software").about("Run the silent software installer"))
        .subcommand(
            Command::new("database")
                .about("Create the listener and the database with DBCA")
                .arg(
                    Arg::new("name")
                        .help("Database name, also used as SID")
                        .long("name")
                        .short('n'),
                ),
        )
        .subcommand(Command::new("check").about("Report what is installed and running"))
}

fn topic(name: &'static str, about: &'static str, topics: &'static [&'static str]) -> Command {
    Command::new(name).about(about).arg(
        positional("topic", "Topic to configure")
            .value_parser(topics.iter().copied().collect::<Vec<_>>()),
    )
}

fn labs() -> Command {
    Command::new("labs")
        .about("Provisioning scripts tp01 to tp15")
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List the lab catalog"))
        .subcommand(
            Command::new("run")
                .about("Run one lab")
                .arg(positional("number", "Lab number, 01 to 15")),
        )
        .subcommand(
            Command::new("run-all")
                .about("Run labs in order, stopping at the first failure")
                .arg(Arg::new("from").help("First lab").long("from").default_value("01"))
                .arg(Arg::new("to").help("Last lab").long("to").default_value("15"))
                .arg(flag("keep-going", "Continue after a failed lab")),
        )
}

fn download() -> Command {
    Command::new("download")
        .about("Download or locate the Oracle 19c installation archive")
        .arg(positional("component", "Archive to fetch").value_parser(["database", "grid"]))
        .arg(
            Arg::new("url")
                .help("Direct download URL")
                .long("url")
                .conflicts_with("from-drive"),
        )
        .arg(flag("from-drive", "Use the configured Google Drive file"))
        .arg(
            Arg::new("dir")
                .help("Download directory")
                .long("dir")
                .default_value(crate::ops::download::DEFAULT_DIR)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(flag("extract", "Extract into ORACLE_HOME afterwards"))
}

fn genrsp() -> Command {
    Command::new("genrsp")
        .about("Generate silent-install response files")
        .arg(
            positional("template", "Response file to generate")
                .value_parser(["all", "db-install", "dbca", "netca"]),
        )
        .arg(
            Arg::new("output")
                .help("Output file for a single template")
                .long("output")
                .short('o')
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output-dir")
                .help("Output directory")
                .long("output-dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
}

fn rman() -> Command {
    Command::new("rman")
        .about("RMAN backup and recovery")
        .subcommand_required(true)
        .subcommand(
            Command::new("setup")
                .about("Configure retention, autobackup and compression")
                .arg(
                    Arg::new("retention")
                        .help("Recovery window in days")
                        .long("retention")
                        .default_value("7")
                        .value_parser(value_parser!(u32)),
                )
                .arg(flag("no-compression", "Do not enable backup compression")),
        )
        .subcommand(
            Command::new("backup")
                .about("Take a backup")
                .arg(
                    Arg::new("type")
                        .help("Backup type")
                        .long("type")
                        .short('t')
                        .default_value("full")
                        .value_parser(["full", "incremental", "archive"]),
                )
                .arg(Arg::new("tag").help("Backup tag").long("tag")),
        )
        .subcommand(
            Command::new("restore")
                .about("Restore and recover the database")
                .arg(
                    Arg::new("until")
                        .help("Point in time, YYYY-MM-DD HH:MM:SS")
                        .long("until"),
                )
                .arg(yes()),
        )
        .subcommand(
            Command::new("list").about("List backups").arg(
                Arg::new("type")
                    .help("What to list")
                    .long("type")
                    .default_value("backup")
                    .value_parser(["backup", "archivelog", "all"]),
            ),
        )
}

fn dataguard() -> Command {
    Command::new("dataguard")
        .about("Data Guard standby management")
        .subcommand_required(true)
        .subcommand(
            Command::new("setup")
                .about("Configure a primary and standby pair (lab 09)")
                .arg(Arg::new("primary").help("Primary host").long("primary").required(true))
                .arg(Arg::new("standby").help("Standby host").long("standby").required(true))
                .arg(Arg::new("db-name").help("Database name").long("db-name")),
        )
        .subcommand(Command::new("status").about("Role, protection mode and apply processes"))
        .subcommand(
            Command::new("switchover")
                .about("Switch roles with the standby")
                .arg(positional("target", "Target database")),
        )
        .subcommand(
            Command::new("failover")
                .about("Fail over to the standby")
                .arg(positional("target", "Target database"))
                .arg(yes()),
        )
}

fn snapshot(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .help(help)
        .long(id)
        .value_parser(value_parser!(u64))
}

fn tuning() -> Command {
    Command::new("tuning")
        .about("Performance diagnostics")
        .subcommand_required(true)
        .subcommand(
            Command::new("analyze")
                .about("Run the tuning lab (lab 10)")
                .arg(flag("deep", "Deep analysis")),
        )
        .subcommand(
            Command::new("awr")
                .about("AWR text report")
                .arg(snapshot("begin", "Begin snapshot id"))
                .arg(snapshot("end", "End snapshot id")),
        )
        .subcommand(
            Command::new("addm")
                .about("ADDM analysis report")
                .arg(snapshot("begin", "Begin snapshot id"))
                .arg(snapshot("end", "End snapshot id")),
        )
        .subcommand(
            Command::new("sql-trace").about("Enable SQL trace").arg(
                Arg::new("sid")
                    .help("Session id, current session when omitted")
                    .long("sid")
                    .value_parser(value_parser!(u32)),
            ),
        )
}

fn asm() -> Command {
    Command::new("asm")
        .about("Automatic Storage Management")
        .subcommand_required(true)
        .subcommand(
            Command::new("setup")
                .about("Prepare ASM disks (lab 15)")
                .arg(list("disks", "Disk devices").required(true)),
        )
        .subcommand(
            Command::new("create-diskgroup")
                .about("Create a disk group")
                .arg(positional("name", "Disk group name"))
                .arg(
                    Arg::new("redundancy")
                        .help("Redundancy level")
                        .long("redundancy")
                        .default_value("external")
                        .value_parser(["external", "normal", "high"]),
                )
                .arg(list("disks", "Disk paths").required(true)),
        )
        .subcommand(Command::new("status").about("Disk groups and disks"))
}

fn rac() -> Command {
    Command::new("rac")
        .about("Real Application Clusters")
        .subcommand_required(true)
        .subcommand(
            Command::new("setup")
                .about("Prepare cluster nodes (lab 15)")
                .arg(list("nodes", "Node host names").required(true))
                .arg(list("vips", "Virtual host names").required(true)),
        )
        .subcommand(
            Command::new("add-node")
                .about("Extend the cluster with a node")
                .arg(Arg::new("host").help("New node").long("host").required(true))
                .arg(Arg::new("vip").help("New node VIP").long("vip").required(true)),
        )
        .subcommand(Command::new("status").about("Cluster resources and database status"))
}

fn pdb() -> Command {
    Command::new("pdb")
        .about("Pluggable databases")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("Create and open a PDB")
                .arg(positional("name", "PDB name"))
                .arg(
                    Arg::new("admin-user")
                        .help("PDB admin user")
                        .long("admin-user")
                        .default_value(crate::ops::pdb::DEFAULT_ADMIN_USER),
                )
                .arg(password("ORADBA_PDB_ADMIN_PASSWORD")),
        )
        .subcommand(
            Command::new("clone")
                .about("Clone a PDB")
                .arg(positional("source", "Source PDB"))
                .arg(positional("target", "New PDB")),
        )
        .subcommand(Command::new("list").about("List PDBs"))
        .subcommand(
            Command::new("open")
                .about("Open a PDB and save its state")
                .arg(positional("name", "PDB name")),
        )
        .subcommand(
            Command::new("close")
                .about("Close a PDB")
                .arg(positional("name", "PDB name")),
        )
        .subcommand(
            Command::new("drop")
                .about("Close and drop a PDB")
                .arg(positional("name", "PDB name"))
                .arg(flag("keep-datafiles", "Keep the datafiles"))
                .arg(yes()),
        )
}

fn flashback() -> Command {
    Command::new("flashback")
        .about("Flashback database and table")
        .subcommand_required(true)
        .subcommand(
            Command::new("enable").about("Enable flashback database").arg(
                Arg::new("retention")
                    .help("Retention target in minutes")
                    .long("retention")
                    .default_value("2880")
                    .value_parser(value_parser!(u32)),
            ),
        )
        .subcommand(Command::new("disable").about("Disable flashback database"))
        .subcommand(
            Command::new("restore")
                .about("Flash the database back")
                .arg(positional("target", "SCN or YYYY-MM-DD HH:MM:SS"))
                .arg(yes()),
        )
        .subcommand(
            Command::new("table")
                .about("Flash a table back")
                .arg(positional("table", "[SCHEMA.]TABLE"))
                .arg(positional("timestamp", "YYYY-MM-DD HH:MM:SS")),
        )
        .subcommand(Command::new("status").about("Log mode and flashback state"))
}

fn protection() -> Command {
    Command::new("protection")
        .about("Archivelog mode and fast recovery area")
        .subcommand_required(true)
        .subcommand(
            Command::new("archivelog")
                .about("Show or enable archivelog mode")
                .arg(flag("enable", "Switch the database to ARCHIVELOG")),
        )
        .subcommand(
            Command::new("fra")
                .about("Show or configure the fast recovery area")
                .arg(Arg::new("size").help("Size, e.g. 10G").long("size"))
                .arg(Arg::new("dest").help("Destination directory").long("dest")),
        )
}

fn security() -> Command {
    let user = || positional("user", "User name");
    Command::new("security")
        .about("Accounts, audit and encryption")
        .subcommand_required(true)
        .subcommand(
            Command::new("audit")
                .about("Enable or disable auditing")
                .arg(flag("disable", "Disable auditing instead")),
        )
        .subcommand(Command::new("audit-trail").about("Audit records of the last 7 days"))
        .subcommand(
            Command::new("tde")
                .about("Create and open the TDE keystore")
                .arg(password("ORADBA_TDE_PASSWORD")),
        )
        .subcommand(
            Command::new("users")
                .about("List, create or drop users")
                .arg(
                    Arg::new("create")
                        .help("Create this user")
                        .long("create")
                        .conflicts_with("drop"),
                )
                .arg(Arg::new("drop").help("Drop this user").long("drop"))
                .arg(password("ORADBA_USER_PASSWORD"))
                .arg(
                    Arg::new("tablespace")
                        .help("Default tablespace")
                        .long("tablespace")
                        .default_value(crate::ops::security::DEFAULT_TABLESPACE),
                )
                .arg(
                    Arg::new("profile")
                        .help("Profile")
                        .long("profile")
                        .default_value(crate::ops::security::DEFAULT_PROFILE),
                )
                .arg(yes()),
        )
        .subcommand(Command::new("lock").about("Lock an account").arg(user()))
        .subcommand(Command::new("unlock").about("Unlock an account").arg(user()))
        .subcommand(
            Command::new("grant")
                .about("Grant privileges")
                .arg(positional("privilege", "Comma separated privileges"))
                .arg(user()),
        )
        .subcommand(
            Command::new("profile")
                .about("Create a password profile")
                .arg(positional("name", "Profile name")),
        )
}

fn nfs() -> Command {
    let clients = || list("clients", "Allowed clients (default: everyone)");
    Command::new("nfs")
        .about("Shared filesystems")
        .subcommand_required(true)
        .subcommand(
            Command::new("setup-server")
                .about("Export a directory over NFS")
                .arg(positional("path", "Directory to export"))
                .arg(clients()),
        )
        .subcommand(
            Command::new("setup-client")
                .about("Mount an export and add it to fstab")
                .arg(positional("server", "NFS server"))
                .arg(positional("remote", "Exported path"))
                .arg(positional("mount-point", "Local mount point")),
        )
        .subcommand(
            Command::new("mount")
                .about("Mount an export")
                .arg(positional("server", "NFS server"))
                .arg(positional("remote", "Exported path"))
                .arg(positional("mount-point", "Local mount point")),
        )
        .subcommand(
            Command::new("share")
                .about("Share an existing directory")
                .arg(positional("dir", "Directory"))
                .arg(clients()),
        )
}

fn storage() -> Command {
    Command::new("storage")
        .about("Tablespaces and redo logs")
        .subcommand_required(true)
        .subcommand(Command::new("tablespaces").about("Tablespace usage"))
        .subcommand(
            Command::new("create-tablespace")
                .about("Create a tablespace")
                .arg(positional("name", "Tablespace name"))
                .arg(Arg::new("size").help("Initial size").long("size").default_value("100M"))
                .arg(flag("no-autoextend", "Disable autoextend")),
        )
        .subcommand(
            Command::new("drop-tablespace")
                .about("Drop a tablespace with its contents and datafiles")
                .arg(positional("name", "Tablespace name"))
                .arg(yes()),
        )
        .subcommand(
            Command::new("redo-add")
                .about("Add a redo log group")
                .arg(Arg::new("size").help("Member size").long("size").default_value("200M")),
        )
}

/// Pure clap command definitions with zero business logic
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .help("Increase verbosity (-v info, -vv debug, -vvv trace)")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("config")
                .env("ORADBA_CONFIG")
                .help("YAML configuration file")
                .long("config")
                .short('c')
                .global(true)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log-dir")
                .env("ORADBA_LOG_DIR")
                .help("Directory for operation logs")
                .long("log-dir")
                .global(true)
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("scripts-dir")
                .env("ORADBA_SCRIPTS_DIR")
                .help("Directory holding the tpNN provisioning scripts")
                .long("scripts-dir")
                .global(true)
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(install())
        .subcommand(topic(
            "configure",
            "Post-install configuration labs",
            &["multiplexing", "storage", "users", "flashback", "backup", "dataguard", "all"],
        ))
        .subcommand(topic("maintenance", "Maintenance labs", &["tune", "patch"]))
        .subcommand(topic(
            "advanced",
            "Advanced feature labs",
            &["multitenant", "ai-ml", "data-mobility", "asm-rac"],
        ))
        .subcommand(labs())
        .subcommand(
            Command::new("vm-init")
                .about("Prepare a fresh VM for its role")
                .arg(
                    Arg::new("role")
                        .help("Role of this VM")
                        .long("role")
                        .required(true)
                        .value_parser(["database", "rac-node", "dataguard-standby"]),
                )
                .arg(
                    Arg::new("node-number")
                        .help("RAC node number")
                        .long("node-number")
                        .value_parser(value_parser!(u8)),
                ),
        )
        .subcommand(
            Command::new("precheck")
                .about("Check the host before installing")
                .arg(flag("fix", "Write a script that fixes the reported issues"))
                .arg(
                    Arg::new("output")
                        .help("Fix script path")
                        .long("output")
                        .short('o')
                        .default_value("fix-precheck-issues.sh")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("test")
                .about("Post-installation smoke tests")
                .arg(flag("report", "Also write oracle-test-report.txt")),
        )
        .subcommand(download())
        .subcommand(genrsp())
        .subcommand(rman())
        .subcommand(dataguard())
        .subcommand(tuning())
        .subcommand(asm())
        .subcommand(rac())
        .subcommand(pdb())
        .subcommand(flashback())
        .subcommand(protection())
        .subcommand(security())
        .subcommand(nfs())
        .subcommand(Command::new("status").about("Instance, tablespace and PDB status"))
        .subcommand(Command::new("start").about("Start the listener and the database"))
        .subcommand(Command::new("stop").about("Stop the database and the listener"))
        .subcommand(Command::new("restart").about("Stop, then start"))
        .subcommand(
            Command::new("sqlplus")
                .about("Interactive SQL*Plus as sysdba")
                .arg(Arg::new("pdb").help("Connect to this PDB").long("pdb")),
        )
        .subcommand(
            Command::new("exec")
                .about("Run a .sql or .sh script")
                .arg(positional("script", "Script path").value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("logs")
                .about("Tail the alert or listener log")
                .arg(positional("log", "Which log").value_parser(["alert", "listener"]))
                .arg(
                    Arg::new("tail")
                        .help("Number of lines")
                        .long("tail")
                        .short('n')
                        .default_value("50")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("monitor")
                .about("Tablespace usage or sessions")
                .arg(positional("what", "What to show").value_parser(["tablespaces", "sessions"]))
                .arg(flag("active-only", "Only ACTIVE sessions")),
        )
        .subcommand(storage())
        .subcommand(
            Command::new("web")
                .about("Serve the JSON control panel")
                .arg(
                    Arg::new("listen")
                        .env("ORADBA_LISTEN")
                        .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                        .long("listen")
                        .long_help(
                            "IP address to bind to:\n\
                            Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                            Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                            Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                            Specific IPv6: '::', '::1'"
                        )
                        .short('l')
                        .value_name("IP")
                        .value_parser(value_parser!(IpAddr)),
                )
                .arg(
                    Arg::new("port")
                        .env("ORADBA_PORT")
                        .help("Listening port (default: web.port from the configuration)")
                        .long("port")
                        .short('p')
                        .value_parser(value_parser!(u16)),
                )
                .arg(
                    Arg::new("state-dir")
                        .env("ORADBA_STATE_DIR")
                        .help("Directory for the credential store")
                        .long("state-dir")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_new() {
        let cmd = new();
        assert_eq!(cmd.get_name(), "oradba");
        assert_eq!(
            cmd.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            cmd.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
        cmd.debug_assert();
    }

    #[test]
    fn test_no_args_is_an_error() {
        assert!(new().try_get_matches_from(["oradba"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        let m = new()
            .try_get_matches_from(["oradba", "-vv", "status"])
            .unwrap();
        assert_eq!(m.get_count("verbose"), 2);
    }

    #[test]
    fn test_global_dirs_after_subcommand() {
        let m = new()
            .try_get_matches_from(["oradba", "status", "--log-dir", "/tmp/logs"])
            .unwrap();
        assert_eq!(
            m.get_one::<PathBuf>("log-dir"),
            Some(&PathBuf::from("/tmp/logs"))
        );
    }

    #[test]
    fn test_install_without_subcommand() {
        let m = new().try_get_matches_from(["oradba", "install"]).unwrap();
        let (name, sub) = m.subcommand().unwrap();
        assert_eq!(name, "install");
        assert!(sub.subcommand().is_none());
    }

    #[test]
    fn test_rejects_unknown_topic() {
        assert!(
            new()
                .try_get_matches_from(["oradba", "configure", "sharding"])
                .is_err()
        );
    }

    #[test]
    fn test_download_url_conflicts_with_drive() {
        assert!(
            new()
                .try_get_matches_from([
                    "oradba",
                    "download",
                    "database",
                    "--url",
                    "http://mirror/db.zip",
                    "--from-drive"
                ])
                .is_err()
        );
    }

    #[test]
    fn test_disk_lists_split_on_commas() {
        let m = new()
            .try_get_matches_from([
                "oradba",
                "asm",
                "create-diskgroup",
                "DATA",
                "--disks",
                "/dev/sdb1,/dev/sdc1",
            ])
            .unwrap();
        let (_, asm) = m.subcommand().unwrap();
        let (_, create) = asm.subcommand().unwrap();
        let disks: Vec<&String> = create.get_many::<String>("disks").unwrap().collect();
        assert_eq!(disks, ["/dev/sdb1", "/dev/sdc1"]);
    }

    #[test]
    fn test_web_listen_must_be_an_ip() {
        assert!(
            new()
                .try_get_matches_from(["oradba", "web", "--listen", "not-an-ip"])
                .is_err()
        );
    }
}
