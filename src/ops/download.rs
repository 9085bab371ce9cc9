//! Fetch, verify and unpack the Oracle 19c installation archives.

use super::{Context, Outcome};
use crate::{
    error::{Error, Result},
    runner::{Echo, Invocation, SuccessCheck},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fmt,
    fs::{self, File},
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

pub const VERSION: &str = "19.3.0.0.0";
pub const DEFAULT_DIR: &str = "/opt/oracle/install";
pub const DOWNLOAD_PAGE: &str =
    "https://www.oracle.com/database/technologies/oracle-database-software-downloads.html";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: &'static str,
    pub size: u64,
    pub md5: &'static str,
    pub title: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Database,
    Grid,
}

impl Component {
    #[must_use]
    pub const fn artifact(self) -> Artifact {
        match self {
            Self::Database => Artifact {
                file_name: "LINUX.X64_193000_db_home.zip",
                size: 2_889_184_573,
                md5: "ba8329c757133da313ed3b6d7f86c5ac",
                title: "Oracle Database 19c (19.3) for Linux x86-64",
            },
            Self::Grid => Artifact {
                file_name: "LINUX.X64_193000_grid_home.zip",
                size: 2_989_041_158,
                md5: "e96ec0427e8514856e5e0333e07e097f",
                title: "Oracle Grid Infrastructure 19c (19.3) for Linux x86-64",
            },
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Database => "database",
            Self::Grid => "grid",
        })
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "database" => Ok(Self::Database),
            "grid" => Ok(Self::Grid),
            _ => Err(Error::invalid("component", s, "expected database or grid")),
        }
    }
}

/// Direct download link for a Google Drive file id.
#[must_use]
pub fn drive_url(file_id: &str) -> String {
    format!("https://drive.usercontent.google.com/download?id={file_id}&export=download&confirm=t")
}

/// Manual download steps for when no URL is available.
#[must_use]
pub fn instructions(component: Component, dir: &Path) -> Vec<String> {
    let artifact = component.artifact();
    vec![
        "Oracle licensing requires the software to be downloaded manually:".to_string(),
        format!("  1. Open {DOWNLOAD_PAGE}"),
        "  2. Accept the license agreement".to_string(),
        format!("  3. Download {} ({})", artifact.title, artifact.file_name),
        format!("  4. Place the file in {}/", dir.display()),
        format!(
            "Then run: oradba download {component} --dir {}",
            dir.display()
        ),
    ]
}

/// MD5 digest computed by the system `md5sum`.
///
/// # Errors
///
/// Returns `ToolFailed` if `md5sum` fails or prints nothing usable
pub fn md5sum(ctx: &Context, path: &Path) -> Result<String> {
    let invocation = Invocation::new("md5sum").arg(path.to_string_lossy());
    let captured = SuccessCheck::ExitCode.require(ctx.exec.capture(&invocation)?, "md5sum", None)?;
    captured
        .output
        .split_whitespace()
        .next()
        .filter(|digest| digest.len() == 32)
        .map(str::to_lowercase)
        .ok_or_else(|| Error::ToolFailed {
            tool: "md5sum".to_string(),
            exit_code: captured.exit_code,
            excerpt: captured.tail(crate::runner::check::EXCERPT_LINES),
            log: None,
        })
}

fn verify(ctx: &Context, path: &Path, expected: &str) -> Result<()> {
    tracing::info!(path = %path.display(), "verifying checksum");
    let actual = md5sum(ctx, path)?;
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

fn progress_bar(echo: &Echo, len: u64, template: &str) -> ProgressBar {
    if matches!(echo, Echo::Silent | Echo::Log(_)) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar
}

fn fetch(ctx: &Context, url: &str, target: &Path, expected_len: u64) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    let bar = progress_bar(
        &ctx.echo,
        response.content_length().unwrap_or(expected_len),
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
    );
    let mut file = File::create(target)?;
    io::copy(&mut bar.wrap_read(response), &mut file)?;
    bar.finish_and_clear();
    Ok(())
}

/// Download `component` from `url` into `dir`.
///
/// A file already present with the right checksum is reused; one with the
/// wrong checksum is replaced. A failed transfer leaves nothing behind.
///
/// # Errors
///
/// Returns `Http` or `Io` on transfer failure and `ChecksumMismatch` when
/// the downloaded file does not verify
pub fn download_from_url(ctx: &Context, url: &str, dir: &Path, component: Component) -> Result<PathBuf> {
    let artifact = component.artifact();
    fs::create_dir_all(dir)?;
    let target = dir.join(artifact.file_name);

    if target.is_file() {
        match verify(ctx, &target, artifact.md5) {
            Ok(()) => {
                tracing::info!(path = %target.display(), "already downloaded and verified");
                return Ok(target);
            }
            Err(Error::ChecksumMismatch { .. }) => {
                tracing::warn!(path = %target.display(), "checksum mismatch, downloading again");
                fs::remove_file(&target)?;
            }
            Err(err) => return Err(err),
        }
    }

    tracing::info!(url, path = %target.display(), "downloading");
    let result = fetch(ctx, url, &target, artifact.size).and_then(|()| verify(ctx, &target, artifact.md5));
    if let Err(err) = result {
        if target.exists() {
            fs::remove_file(&target)?;
        }
        return Err(err);
    }
    Ok(target)
}

/// A manually placed archive in `dir`, verified.
///
/// # Errors
///
/// Returns `Precondition` carrying the download instructions when the file
/// is absent and `ChecksumMismatch` when it does not verify
pub fn locate(ctx: &Context, dir: &Path, component: Component) -> Result<PathBuf> {
    let artifact = component.artifact();
    let path = dir.join(artifact.file_name);
    if !path.is_file() {
        return Err(Error::Precondition(format!(
            "{} not found\n{}",
            path.display(),
            instructions(component, dir).join("\n")
        )));
    }
    verify(ctx, &path, artifact.md5)?;
    Ok(path)
}

/// Unpack `archive` into `dest`, keeping unix permissions.
///
/// Entries that would escape `dest` are skipped. Returns the number of
/// files written.
///
/// # Errors
///
/// Returns `Zip` for a corrupt archive and `Io` on write failure
pub fn extract(archive: &Path, dest: &Path, echo: &Echo) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let bar = progress_bar(
        echo,
        zip.len() as u64,
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files",
    );

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        bar.inc(1);
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!(name = entry.name(), "skipping entry outside the destination");
            continue;
        };
        let path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&path)?;
        io::copy(&mut entry, &mut out)?;
        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
        written += 1;
    }
    bar.finish_and_clear();
    Ok(written)
}

/// Download (or locate) the archive, then unpack it into `ORACLE_HOME`.
///
/// # Errors
///
/// Any error from [`download_from_url`], [`locate`] or [`extract`]
pub fn prepare_installation(
    ctx: &Context,
    component: Component,
    url: Option<&str>,
    dir: &Path,
) -> Result<Outcome> {
    let archive = match url {
        Some(url) => download_from_url(ctx, url, dir, component)?,
        None => locate(ctx, dir, component)?,
    };
    let home = ctx.config.oracle_home().to_path_buf();
    let files = extract(&archive, &home, &ctx.echo)?;
    Ok(Outcome::new(format!(
        "{} extracted into {} ({files} files)",
        archive.display(),
        home.display()
    )))
}
