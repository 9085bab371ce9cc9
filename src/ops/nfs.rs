//! NFS exports and client mounts for shared backup and staging areas.

use super::{Context, Outcome};
use crate::{
    error::Result,
    runner::{Invocation, SuccessCheck},
    validation,
};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

pub const SERVER_OPTIONS: &str = "rw,sync,no_root_squash,no_all_squash";
pub const SHARE_OPTIONS: &str = "rw,sync,no_root_squash";

/// Files edited in place; tests point them into a scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsFiles {
    pub exports: PathBuf,
    pub fstab: PathBuf,
}

impl Default for NfsFiles {
    fn default() -> Self {
        Self {
            exports: PathBuf::from("/etc/exports"),
            fstab: PathBuf::from("/etc/fstab"),
        }
    }
}

/// Append `line` unless an identical line is already there.
///
/// Returns whether the file changed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written
pub fn append_unique(path: &Path, line: &str) -> io::Result<bool> {
    let existing = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };
    if existing.lines().any(|l| l.trim() == line.trim()) {
        return Ok(false);
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{line}")?;
    Ok(true)
}

/// `<path> <client>(<options>) ...`, or `*` for everyone.
#[must_use]
pub fn export_line(path: &str, clients: &[String], options: &str) -> String {
    let targets = if clients.is_empty() {
        format!("*({options})")
    } else {
        clients
            .iter()
            .map(|client| format!("{client}({options})"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!("{path} {targets}")
}

fn run(ctx: &Context, invocation: &Invocation) -> Result<String> {
    let captured = ctx.exec.capture(invocation)?;
    let tool = invocation
        .args
        .first()
        .map_or_else(|| invocation.tool().to_string(), |arg| format!("{} {arg}", invocation.tool()));
    Ok(SuccessCheck::ExitCode.require(captured, &tool, None)?.output)
}

fn install_package(ctx: &Context) {
    let yum = Invocation::new("yum").args(["install", "-y", "nfs-utils"]);
    match run(ctx, &yum) {
        Ok(_) => tracing::debug!("nfs-utils installed"),
        Err(err) => tracing::warn!(error = %err, "nfs-utils install failed, continuing"),
    }
}

fn validate_clients(clients: &[String]) -> Result<()> {
    for client in clients {
        validation::nfs_client(client)?;
    }
    Ok(())
}

/// Export `path` and start the server.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad path or client, `Io` if the exports file
/// cannot be updated and `ToolFailed` if a command fails
pub fn setup_server(ctx: &Context, files: &NfsFiles, path: &str, clients: &[String]) -> Result<Outcome> {
    let path = validation::absolute_path(path)?;
    validate_clients(clients)?;

    install_package(ctx);
    run(ctx, &Invocation::new("mkdir").args(["-p", path]))?;
    let line = export_line(path, clients, SERVER_OPTIONS);
    if !append_unique(&files.exports, &line)? {
        tracing::info!(path, "export already present");
    }
    run(ctx, &Invocation::new("exportfs").arg("-ra"))?;
    run(ctx, &Invocation::new("systemctl").args(["enable", "nfs-server"]))?;
    run(ctx, &Invocation::new("systemctl").args(["start", "nfs-server"]))?;
    Ok(Outcome::new(format!("NFS server exporting {path}")).with_output(line))
}

/// # Errors
///
/// Returns `InvalidInput` for a bad server or path and `ToolFailed` if the
/// mount fails
pub fn mount(ctx: &Context, server: &str, remote: &str, mount_point: &str) -> Result<Outcome> {
    let server = validation::hostname(server)?;
    let remote = validation::absolute_path(remote)?;
    let mount_point = validation::absolute_path(mount_point)?;
    run(ctx, &Invocation::new("mkdir").args(["-p", mount_point]))?;
    run(
        ctx,
        &Invocation::new("mount")
            .args(["-t", "nfs"])
            .arg(format!("{server}:{remote}"))
            .arg(mount_point),
    )?;
    Ok(Outcome::new(format!("{server}:{remote} mounted on {mount_point}")))
}

/// Install, mount and persist the mount in fstab.
///
/// # Errors
///
/// Same as [`mount`], plus `Io` if fstab cannot be updated
pub fn setup_client(
    ctx: &Context,
    files: &NfsFiles,
    server: &str,
    remote: &str,
    mount_point: &str,
) -> Result<Outcome> {
    let server = validation::hostname(server)?;
    let remote = validation::absolute_path(remote)?;
    let mount_point = validation::absolute_path(mount_point)?;

    install_package(ctx);
    let outcome = mount(ctx, server, remote, mount_point)?;
    append_unique(
        &files.fstab,
        &format!("{server}:{remote} {mount_point} nfs defaults 0 0"),
    )?;
    Ok(outcome)
}

/// Export an existing directory without touching the service state.
///
/// # Errors
///
/// Returns `InvalidInput` for a bad path or client, `Precondition` when the
/// directory does not exist and `ToolFailed` if `exportfs` fails
pub fn share(ctx: &Context, files: &NfsFiles, dir: &str, clients: &[String]) -> Result<Outcome> {
    let dir = validation::absolute_path(dir)?;
    validate_clients(clients)?;
    if !Path::new(dir).is_dir() {
        return Err(crate::Error::Precondition(format!("directory not found: {dir}")));
    }
    let line = export_line(dir, clients, SHARE_OPTIONS);
    append_unique(&files.exports, &line)?;
    run(ctx, &Invocation::new("exportfs").arg("-ra"))?;
    Ok(Outcome::new(format!("{dir} shared")).with_output(line))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::ops::testing::{RecordingExecutor, context};
    use std::sync::Arc;

    fn files(dir: &Path) -> NfsFiles {
        NfsFiles {
            exports: dir.join("exports"),
            fstab: dir.join("fstab"),
        }
    }

    #[test]
    fn test_append_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports");
        fs::write(&path, "/srv/a *(ro)").unwrap();
        assert!(append_unique(&path, "/srv/b *(rw)").unwrap());
        assert!(!append_unique(&path, "/srv/b *(rw)").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "/srv/a *(ro)\n/srv/b *(rw)\n");
    }

    #[test]
    fn test_export_line() {
        assert_eq!(
            export_line("/u01/backup", &[], SERVER_OPTIONS),
            "/u01/backup *(rw,sync,no_root_squash,no_all_squash)"
        );
        assert_eq!(
            export_line("/u01/backup", &["10.0.0.0/24".to_string(), "db2".to_string()], SHARE_OPTIONS),
            "/u01/backup 10.0.0.0/24(rw,sync,no_root_squash) db2(rw,sync,no_root_squash)"
        );
    }

    #[test]
    fn test_setup_server_continues_after_yum_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default().respond("yum install", 1, "No match for argument"));
        let ctx = context(&exec, dir.path());
        let files = files(dir.path());
        setup_server(&ctx, &files, "/u01/nfs_share", &[]).unwrap();
        setup_server(&ctx, &files, "/u01/nfs_share", &[]).unwrap();

        let exports = fs::read_to_string(&files.exports).unwrap();
        assert_eq!(exports.lines().count(), 1);
        let lines = exec.command_lines();
        assert!(lines.contains(&"exportfs -ra".to_string()));
        assert!(lines.contains(&"systemctl start nfs-server".to_string()));
    }

    #[test]
    fn test_setup_client_writes_fstab() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(&exec, dir.path());
        let files = files(dir.path());
        setup_client(&ctx, &files, "nfs1.lab.local", "/u01/nfs_share", "/mnt/backup").unwrap();

        assert_eq!(
            fs::read_to_string(&files.fstab).unwrap(),
            "nfs1.lab.local:/u01/nfs_share /mnt/backup nfs defaults 0 0\n"
        );
        assert!(exec
            .command_lines()
            .contains(&"mount -t nfs nfs1.lab.local:/u01/nfs_share /mnt/backup".to_string()));
    }

    #[test]
    fn test_mount_failure_stops_before_fstab() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default().respond("mount -t", 32, "mount.nfs: access denied"));
        let ctx = context(&exec, dir.path());
        let files = files(dir.path());
        assert!(setup_client(&ctx, &files, "nfs1", "/export", "/mnt/x").is_err());
        assert!(!files.fstab.exists());
    }

    #[test]
    fn test_share_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::default());
        let ctx = context(&exec, dir.path());
        let missing = dir.path().join("nope");
        assert!(share(&ctx, &files(dir.path()), &missing.to_string_lossy(), &[]).is_err());
        assert!(share(&ctx, &files(dir.path()), "/tmp", &["host;rm".to_string()]).is_err());
    }
}
