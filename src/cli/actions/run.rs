use super::{
    Action, Asm, DataGuard, Flashback, Install, LogKind, Nfs, Pdb, Protection, Rac, Rman,
    Security, Source, Storage, Tuning,
};
use crate::{
    config::Config,
    console,
    error::Error,
    ops::{
        self, Context, Outcome, asm, database, dataguard, download, flashback, install, labs,
        nfs::{self, NfsFiles},
        pdb, precheck, protection, rac, rman, security, smoke, storage, tuning,
    },
    response_files,
    runner::{Echo, Executor, SystemExecutor},
    sequencer::{AutoConfirm, Confirm, PromptConfirm},
    sqlplus::SqlTable,
};
use anyhow::{Context as _, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::{io, path::Path, sync::Arc, time::Duration};
use tokio::task;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Globals {
    pub config: Config,
    pub verbosity: u8,
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn show(outcome: &Outcome) {
    println!("{}", console::success(&outcome.summary));
    let output = outcome.output.trim_end();
    if !output.is_empty() {
        println!("{output}");
    }
}

/// Ask before a destructive command unless `--yes` was given.
fn confirmed(yes: bool, prompt: &str) -> Result<()> {
    if yes {
        return Ok(());
    }
    let answer = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("confirmation prompt failed")?;
    if answer {
        Ok(())
    } else {
        Err(Error::Cancelled.into())
    }
}

fn secret(value: Option<String>, prompt: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    dialoguer::Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("password prompt failed")
}

struct Runner {
    config: Config,
    exec: Arc<dyn Executor>,
    verbosity: u8,
}

impl Runner {
    fn context(&self, echo: Echo) -> Context {
        Context::new(self.config.clone(), self.exec.clone()).with_echo(echo)
    }

    async fn spawn<T, F>(&self, operation: &'static str, echo: Echo, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Context) -> crate::Result<T> + Send + 'static,
    {
        let ctx = self.context(echo);
        let result = task::spawn_blocking(move || ops::measured(operation, || work(&ctx)))
            .await
            .context("operation task failed")?;
        Ok(result?)
    }

    /// Run `work` off the async runtime behind a spinner.
    async fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Context) -> crate::Result<T> + Send + 'static,
    {
        if self.verbosity > 0 {
            return self.spawn(operation, Echo::Stdout, work).await;
        }
        let bar = spinner();
        let result = self.spawn(operation, Echo::Spinner(bar.clone()), work).await;
        bar.finish_and_clear();
        result
    }

    async fn outcome<F>(&self, operation: &'static str, work: F) -> Result<()>
    where
        F: FnOnce(&Context) -> crate::Result<Outcome> + Send + 'static,
    {
        show(&self.run(operation, work).await?);
        Ok(())
    }

    async fn table<F>(&self, operation: &'static str, work: F) -> Result<()>
    where
        F: FnOnce(&Context) -> crate::Result<SqlTable> + Send + 'static,
    {
        let table = self.run(operation, work).await?;
        if table.is_empty() {
            println!("{}", console::warning("no rows selected"));
        } else {
            println!("{}", table.render());
        }
        Ok(())
    }

    /// Plans print their own progress, so tool output only goes to the logs
    /// unless `-v` was given.
    fn plan_echo(&self) -> Echo {
        if self.verbosity > 0 {
            Echo::Stdout
        } else {
            Echo::Silent
        }
    }

    async fn install(&self, command: Install) -> Result<()> {
        match command {
            Install::All { yes, options } => {
                let ctx = self.context(self.plan_echo());
                let report = task::spawn_blocking(move || {
                    let mut confirm: Box<dyn Confirm> = if yes {
                        Box::new(AutoConfirm)
                    } else {
                        Box::new(PromptConfirm)
                    };
                    install::install_all(&ctx, &options, confirm.as_mut(), &mut io::stdout())
                })
                .await
                .context("installation task failed")??;
                report.into_result()?;
                Ok(())
            }
            Install::System => self.outcome("install_system", install::install_system).await,
            Install::Binaries => {
                self.outcome("install_binaries", install::install_binaries)
                    .await
            }
            Install::Software => {
                self.outcome("install_software", install::install_software)
                    .await
            }
            Install::Database { name } => {
                let config = match name {
                    Some(name) => self.config.clone().with_db_name(&name.to_uppercase()),
                    None => self.config.clone(),
                };
                let runner = Self {
                    config,
                    exec: self.exec.clone(),
                    verbosity: self.verbosity,
                };
                runner
                    .outcome("create_database", install::create_database)
                    .await
            }
            Install::Check => {
                self.outcome("install_check", install::check_installation)
                    .await
            }
        }
    }

    async fn labs_range(&self, from: u8, to: u8, keep_going: bool) -> Result<()> {
        let summary = self
            .run("labs", move |ctx| {
                labs::run_labs(ctx, from, to, &mut |number, err| {
                    eprintln!("{}", console::failure(&format!("Lab {number:02} failed")));
                    eprintln!("{}", console::error_report(err));
                    keep_going
                })
            })
            .await?;
        for number in &summary.completed {
            println!("{}", console::success(&format!("Lab {number:02} completed")));
        }
        if summary.succeeded() {
            Ok(())
        } else {
            let failed: Vec<String> = summary.failed.iter().map(|n| format!("{n:02}")).collect();
            bail!("labs failed: {}", failed.join(", "))
        }
    }

    fn labs_list() {
        println!("{}", console::header("Labs"));
        for lab in &labs::LABS {
            let user = match lab.user {
                labs::RunAs::Root => "root",
                labs::RunAs::Oracle => "oracle",
            };
            println!(
                "  {:02}  {:<22} {:<7} {:<14} {:<10} {}",
                lab.number, lab.name, user, lab.category, lab.duration, lab.description
            );
        }
    }

    async fn vm_init(&self, role: install::VmRole, node: Option<u8>) -> Result<()> {
        let ctx = self.context(self.plan_echo());
        let outcome = task::spawn_blocking(move || {
            ops::measured("vm_init", || {
                install::vm_init(&ctx, role, node, &mut io::stdout())
            })
        })
        .await
        .context("vm-init task failed")??;
        show(&outcome);
        Ok(())
    }

    async fn precheck(&self, fix: Option<std::path::PathBuf>) -> Result<()> {
        let exec = self.exec.clone();
        let report = task::spawn_blocking(move || precheck::evaluate(&precheck::gather(exec.as_ref())))
            .await
            .context("precheck task failed")?;

        println!("{}", console::header("Pre-installation checks"));
        for line in report.render() {
            println!("{line}");
        }

        if let Some(path) = fix {
            precheck::write_fix_script(&report, &path)?;
            println!(
                "{}",
                console::info(&format!("Fix script written to {}", path.display()))
            );
        }

        if report.passed() {
            println!("{}", console::success("System is ready for Oracle 19c"));
            Ok(())
        } else {
            bail!("pre-installation checks failed")
        }
    }

    async fn smoke(&self, write_report: bool) -> Result<()> {
        let ctx = self.context(Echo::Silent);
        let report = task::spawn_blocking(move || smoke::run_all(&ctx))
            .await
            .context("test task failed")?;

        println!("{}", report.render());
        if write_report {
            report.write(Path::new(smoke::REPORT_FILE))?;
            println!(
                "{}",
                console::info(&format!("Report written to {}", smoke::REPORT_FILE))
            );
        }

        if report.all_passed() {
            println!("{}", console::success(&report.summary()));
            Ok(())
        } else {
            bail!(report.summary())
        }
    }

    async fn download(
        &self,
        component: download::Component,
        source: Source,
        dir: std::path::PathBuf,
        extract: bool,
    ) -> Result<()> {
        let url = match source {
            Source::Url(url) => Some(url),
            Source::Drive => Some(download::drive_url(&self.config.google_drive.file_id)),
            Source::Local => None,
        };

        if extract {
            let outcome = self
                .spawn("download", Echo::Stdout, move |ctx| {
                    download::prepare_installation(ctx, component, url.as_deref(), &dir)
                })
                .await?;
            show(&outcome);
            return Ok(());
        }

        let path = self
            .spawn("download", Echo::Stdout, move |ctx| match url {
                Some(url) => download::download_from_url(ctx, &url, &dir, component),
                None => download::locate(ctx, &dir, component),
            })
            .await?;
        println!(
            "{}",
            console::success(&format!("{} verified", path.display()))
        );
        Ok(())
    }

    fn genrsp(
        &self,
        template: Option<response_files::Template>,
        output: Option<std::path::PathBuf>,
        output_dir: &Path,
    ) -> Result<()> {
        let written = match template {
            Some(template) => {
                let path = output.unwrap_or_else(|| output_dir.join(template.file_name()));
                vec![response_files::write(template, &self.config, &path)?]
            }
            None => response_files::generate_all(&self.config, output_dir)?,
        };
        for path in written {
            println!(
                "{}",
                console::success(&format!("Generated {}", path.display()))
            );
        }
        Ok(())
    }

    async fn rman(&self, command: Rman) -> Result<()> {
        match command {
            Rman::Setup {
                retention_days,
                compression,
            } => {
                self.outcome("rman_setup", move |ctx| {
                    rman::setup(ctx, retention_days, compression)
                })
                .await
            }
            Rman::Backup { kind, tag } => {
                self.outcome("rman_backup", move |ctx| {
                    rman::backup(ctx, kind, tag.as_deref())
                })
                .await
            }
            Rman::Restore { until, yes } => {
                confirmed(
                    yes,
                    "Restore the database? The instance will be shut down",
                )?;
                self.outcome("rman_restore", move |ctx| {
                    rman::restore(ctx, until.as_deref())
                })
                .await
            }
            Rman::List { kind } => {
                self.outcome("rman_list", move |ctx| rman::list(ctx, kind))
                    .await
            }
        }
    }

    async fn dataguard(&self, command: DataGuard) -> Result<()> {
        match command {
            DataGuard::Setup {
                primary,
                standby,
                db_name,
            } => {
                let db_name = db_name.unwrap_or_else(|| self.config.database.db_name.clone());
                self.outcome("dataguard_setup", move |ctx| {
                    dataguard::setup(ctx, &primary, &standby, &db_name)
                })
                .await
            }
            DataGuard::Status => self.outcome("dataguard_status", dataguard::status).await,
            DataGuard::Switchover { target } => {
                self.outcome("dataguard_switchover", move |ctx| {
                    dataguard::switchover(ctx, &target)
                })
                .await
            }
            DataGuard::Failover { target, yes } => {
                confirmed(yes, &format!("Fail over to {target}?"))?;
                self.outcome("dataguard_failover", move |ctx| {
                    dataguard::failover(ctx, &target)
                })
                .await
            }
        }
    }

    async fn tuning(&self, command: Tuning) -> Result<()> {
        match command {
            Tuning::Analyze { deep } => {
                self.outcome("tuning_analyze", move |ctx| tuning::analyze(ctx, deep))
                    .await
            }
            Tuning::Awr { begin, end } => {
                self.outcome("tuning_awr", move |ctx| tuning::awr(ctx, begin, end))
                    .await
            }
            Tuning::Addm { begin, end } => {
                self.outcome("tuning_addm", move |ctx| tuning::addm(ctx, begin, end))
                    .await
            }
            Tuning::SqlTrace { sid } => {
                self.outcome("tuning_sql_trace", move |ctx| tuning::sql_trace(ctx, sid))
                    .await
            }
        }
    }

    async fn asm(&self, command: Asm) -> Result<()> {
        match command {
            Asm::Setup { disks } => {
                self.outcome("asm_setup", move |ctx| asm::setup(ctx, &disks))
                    .await
            }
            Asm::CreateDiskgroup {
                name,
                redundancy,
                disks,
            } => {
                self.outcome("asm_create_diskgroup", move |ctx| {
                    asm::create_diskgroup(ctx, &name, redundancy, &disks)
                })
                .await
            }
            Asm::Status => self.outcome("asm_status", asm::status).await,
        }
    }

    async fn rac(&self, command: Rac) -> Result<()> {
        match command {
            Rac::Setup { nodes, vips } => {
                self.outcome("rac_setup", move |ctx| rac::setup(ctx, &nodes, &vips))
                    .await
            }
            Rac::AddNode { host, vip } => {
                self.outcome("rac_add_node", move |ctx| rac::add_node(ctx, &host, &vip))
                    .await
            }
            Rac::Status => self.outcome("rac_status", rac::status).await,
        }
    }

    async fn pdb(&self, command: Pdb) -> Result<()> {
        match command {
            Pdb::Create {
                name,
                admin_user,
                password,
            } => {
                let password = secret(password, &format!("{admin_user} password"))?;
                self.outcome("pdb_create", move |ctx| {
                    pdb::create(ctx, &name, &admin_user, &password)
                })
                .await
            }
            Pdb::Clone { source, target } => {
                self.outcome("pdb_clone", move |ctx| pdb::clone(ctx, &source, &target))
                    .await
            }
            Pdb::List => {
                let pdbs = self.run("pdb_list", pdb::list).await?;
                println!("{:<20} {:<12} {:<10} OPEN TIME", "NAME", "OPEN MODE", "RESTRICTED");
                for info in pdbs {
                    println!(
                        "{:<20} {:<12} {:<10} {}",
                        info.name, info.open_mode, info.restricted, info.open_time
                    );
                }
                Ok(())
            }
            Pdb::Open { name } => {
                self.outcome("pdb_open", move |ctx| pdb::open(ctx, &name))
                    .await
            }
            Pdb::Close { name } => {
                self.outcome("pdb_close", move |ctx| pdb::close(ctx, &name))
                    .await
            }
            Pdb::Drop {
                name,
                including_datafiles,
                yes,
            } => {
                confirmed(yes, &format!("Drop pluggable database {name}?"))?;
                self.outcome("pdb_drop", move |ctx| {
                    pdb::drop(ctx, &name, including_datafiles)
                })
                .await
            }
        }
    }

    async fn flashback(&self, command: Flashback) -> Result<()> {
        match command {
            Flashback::Enable { retention_minutes } => {
                self.outcome("flashback_enable", move |ctx| {
                    flashback::enable(ctx, retention_minutes)
                })
                .await
            }
            Flashback::Disable => self.outcome("flashback_disable", flashback::disable).await,
            Flashback::Restore { target, yes } => {
                confirmed(
                    yes,
                    "Flash back the database? Changes after the target are lost",
                )?;
                self.outcome("flashback_restore", move |ctx| {
                    flashback::restore(ctx, target)
                })
                .await
            }
            Flashback::Table { table, timestamp } => {
                self.outcome("flashback_table", move |ctx| {
                    flashback::flashback_table(ctx, &table, &timestamp)
                })
                .await
            }
            Flashback::Status => {
                let (log_mode, flashback_on) = self.run("flashback_status", flashback::status).await?;
                println!("Log mode:     {log_mode}");
                println!("Flashback on: {flashback_on}");
                Ok(())
            }
        }
    }

    async fn protection(&self, command: Protection) -> Result<()> {
        match command {
            Protection::Archivelog { enable: true } => {
                self.outcome("archivelog_enable", protection::enable_archivelog)
                    .await
            }
            Protection::Archivelog { enable: false } => {
                let mode = self
                    .run("archivelog_status", protection::archivelog_status)
                    .await?;
                println!("Log mode: {mode}");
                Ok(())
            }
            Protection::Fra {
                size: None,
                dest: None,
            } => {
                match self.run("fra_status", protection::fra_status).await? {
                    Some(fra) => {
                        println!("Destination: {}", fra.name);
                        println!("Limit:       {} MB", fra.limit_mb);
                        println!("Used:        {} MB", fra.used_mb);
                        println!("Reclaimable: {} MB", fra.reclaimable_mb);
                        println!("Files:       {}", fra.files);
                    }
                    None => println!(
                        "{}",
                        console::warning("No fast recovery area configured")
                    ),
                }
                Ok(())
            }
            Protection::Fra { size, dest } => {
                let size = size.unwrap_or_else(|| protection::DEFAULT_FRA_SIZE.to_string());
                self.outcome("fra_enable", move |ctx| {
                    protection::enable_fra(ctx, &size, dest.as_deref())
                })
                .await
            }
        }
    }

    async fn security(&self, command: Security) -> Result<()> {
        match command {
            Security::Audit { enable } => {
                self.outcome("security_audit", move |ctx| security::audit(ctx, enable))
                    .await
            }
            Security::AuditTrail => self.table("security_audit_trail", security::audit_trail).await,
            Security::Tde { password } => {
                let password = secret(password, "Keystore password")?;
                self.outcome("security_tde", move |ctx| {
                    security::enable_tde(ctx, &password)
                })
                .await
            }
            Security::Users => self.table("security_users", security::list_users).await,
            Security::CreateUser {
                name,
                password,
                tablespace,
                profile,
            } => {
                let password = secret(password, &format!("Password for {name}"))?;
                self.outcome("security_create_user", move |ctx| {
                    security::create_user(ctx, &name, &password, &tablespace, &profile)
                })
                .await
            }
            Security::DropUser { name, yes } => {
                confirmed(yes, &format!("Drop user {name} and all its objects?"))?;
                self.outcome("security_drop_user", move |ctx| {
                    security::drop_user(ctx, &name)
                })
                .await
            }
            Security::Lock { user } => {
                self.outcome("security_lock", move |ctx| security::lock_user(ctx, &user))
                    .await
            }
            Security::Unlock { user } => {
                self.outcome("security_unlock", move |ctx| {
                    security::unlock_user(ctx, &user)
                })
                .await
            }
            Security::Grant { privilege, user } => {
                self.outcome("security_grant", move |ctx| {
                    security::grant(ctx, &privilege, &user)
                })
                .await
            }
            Security::Profile { name } => {
                self.outcome("security_profile", move |ctx| {
                    security::create_profile(ctx, &name)
                })
                .await
            }
        }
    }

    async fn nfs(&self, command: Nfs) -> Result<()> {
        let files = NfsFiles::default();
        match command {
            Nfs::SetupServer { path, clients } => {
                self.outcome("nfs_setup_server", move |ctx| {
                    nfs::setup_server(ctx, &files, &path, &clients)
                })
                .await
            }
            Nfs::SetupClient {
                server,
                remote,
                mount_point,
            } => {
                self.outcome("nfs_setup_client", move |ctx| {
                    nfs::setup_client(ctx, &files, &server, &remote, &mount_point)
                })
                .await
            }
            Nfs::Mount {
                server,
                remote,
                mount_point,
            } => {
                self.outcome("nfs_mount", move |ctx| {
                    nfs::mount(ctx, &server, &remote, &mount_point)
                })
                .await
            }
            Nfs::Share { dir, clients } => {
                self.outcome("nfs_share", move |ctx| {
                    nfs::share(ctx, &files, &dir, &clients)
                })
                .await
            }
        }
    }

    async fn storage(&self, command: Storage) -> Result<()> {
        match command {
            Storage::Tablespaces => {
                let rows = self.run("storage_tablespaces", storage::tablespaces).await?;
                println!(
                    "{:<20} {:>10} {:>10} {:>10} {:>7} AUTOEXTEND",
                    "TABLESPACE", "SIZE MB", "USED MB", "FREE MB", "USED %"
                );
                for ts in rows {
                    println!(
                        "{:<20} {:>10} {:>10} {:>10} {:>7} {}",
                        ts.name, ts.size_mb, ts.used_mb, ts.free_mb, ts.pct_used, ts.autoextensible
                    );
                }
                Ok(())
            }
            Storage::CreateTablespace {
                name,
                size,
                autoextend,
            } => {
                self.outcome("storage_create_tablespace", move |ctx| {
                    storage::create_tablespace(ctx, &name, &size, autoextend)
                })
                .await
            }
            Storage::DropTablespace { name, yes } => {
                confirmed(
                    yes,
                    &format!("Drop tablespace {name} including contents and datafiles?"),
                )?;
                self.outcome("storage_drop_tablespace", move |ctx| {
                    storage::drop_tablespace(ctx, &name)
                })
                .await
            }
            Storage::RedoAdd { size } => {
                self.outcome("storage_redo_add", move |ctx| {
                    storage::add_redo_log(ctx, &size)
                })
                .await
            }
        }
    }

    async fn logs(&self, log: LogKind, lines: usize) -> Result<()> {
        let tail = self
            .run("logs", move |ctx| {
                let path = match log {
                    LogKind::Alert => database::alert_log_path(ctx),
                    LogKind::Listener => database::listener_log_path(ctx),
                };
                database::tail(&path, lines).map(|tail| (path, tail))
            })
            .await?;
        let (path, tail) = tail;
        println!("{}", console::header(&path.display().to_string()));
        for line in tail {
            println!("{line}");
        }
        Ok(())
    }

    async fn sqlplus(&self, pdb: Option<String>) -> Result<()> {
        let code = self
            .spawn("sqlplus", Echo::Stdout, move |ctx| {
                database::sqlplus(ctx, pdb.as_deref())
            })
            .await?;
        if code == 0 {
            Ok(())
        } else {
            bail!("sqlplus exited with code {code}")
        }
    }
}

/// Execute the action's business logic by delegating to the appropriate module
///
/// # Errors
///
/// Returns the first error of the underlying operation
pub async fn execute(action: Action, globals: Globals) -> Result<()> {
    tracing::debug!(operation = action.operation(), "executing");
    let runner = Runner {
        config: globals.config,
        exec: Arc::new(SystemExecutor),
        verbosity: globals.verbosity,
    };

    match action {
        Action::Install(command) => runner.install(command).await,
        Action::Lab { number } => {
            runner
                .outcome("labs", move |ctx| labs::run_lab(ctx, number, &[]))
                .await
        }
        Action::LabRange {
            from,
            to,
            keep_going,
        } => runner.labs_range(from, to, keep_going).await,
        Action::LabsList => {
            Runner::labs_list();
            Ok(())
        }
        Action::VmInit { role, node } => runner.vm_init(role, node).await,
        Action::Precheck { fix } => runner.precheck(fix).await,
        Action::Test { report } => runner.smoke(report).await,
        Action::Download {
            component,
            source,
            dir,
            extract,
        } => runner.download(component, source, dir, extract).await,
        Action::GenRsp {
            template,
            output,
            output_dir,
        } => runner.genrsp(template, output, &output_dir),
        Action::Rman(command) => runner.rman(command).await,
        Action::DataGuard(command) => runner.dataguard(command).await,
        Action::Tuning(command) => runner.tuning(command).await,
        Action::Asm(command) => runner.asm(command).await,
        Action::Rac(command) => runner.rac(command).await,
        Action::Pdb(command) => runner.pdb(command).await,
        Action::Flashback(command) => runner.flashback(command).await,
        Action::Protection(command) => runner.protection(command).await,
        Action::Security(command) => runner.security(command).await,
        Action::Nfs(command) => runner.nfs(command).await,
        Action::Storage(command) => runner.storage(command).await,
        Action::Status => runner.outcome("database_status", database::status).await,
        Action::Start => runner.outcome("database_start", database::start).await,
        Action::Stop => runner.outcome("database_stop", database::stop).await,
        Action::Restart => runner.outcome("database_restart", database::restart).await,
        Action::SqlPlus { pdb } => runner.sqlplus(pdb).await,
        Action::Exec { script } => {
            runner
                .outcome("exec", move |ctx| database::exec_script(ctx, &script))
                .await
        }
        Action::Logs { log, tail } => runner.logs(log, tail).await,
        Action::MonitorTablespaces => {
            runner
                .table("monitor_tablespaces", storage::tablespace_usage)
                .await
        }
        Action::MonitorSessions { active_only } => {
            runner
                .table("monitor_sessions", move |ctx| {
                    database::sessions(ctx, active_only)
                })
                .await
        }
        Action::Web {
            listen,
            port,
            state_dir,
        } => {
            let mut config = runner.config;
            if let Some(dir) = state_dir {
                config = config.with_state_dir(dir);
            }
            crate::web::serve(config, runner.exec, listen, port).await
        }
    }
}
