use indicatif::ProgressBar;
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Receives child output one line at a time, as it is produced.
pub trait LineSink {
    /// # Errors
    ///
    /// Returns an error if the line cannot be recorded
    fn line(&mut self, line: &str) -> io::Result<()>;
}

/// Discards everything.
pub struct NullSink;

impl LineSink for NullSink {
    fn line(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

impl LineSink for Vec<String> {
    fn line(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Where streamed output is shown besides its log file.
#[derive(Clone, Default)]
pub enum Echo {
    #[default]
    Stdout,
    Silent,
    /// Latest line shown as the spinner message.
    Spinner(ProgressBar),
    /// Appended to another file, e.g. a background job log.
    Log(PathBuf),
}

enum Target {
    Stdout,
    Silent,
    Spinner(ProgressBar),
    File(File),
}

/// Appends every line to a log file and echoes it.
pub struct TeeSink {
    log: File,
    path: PathBuf,
    echo: Target,
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::options().create(true).append(true).open(path)
}

impl TeeSink {
    /// # Errors
    ///
    /// Returns an error if the log file (or echo file) cannot be opened
    pub fn create(path: &Path, echo: &Echo) -> io::Result<Self> {
        let echo = match echo {
            Echo::Stdout => Target::Stdout,
            Echo::Silent => Target::Silent,
            Echo::Spinner(bar) => Target::Spinner(bar.clone()),
            Echo::Log(other) if other == path => Target::Silent,
            Echo::Log(other) => Target::File(open_append(other)?),
        };

        Ok(Self {
            log: open_append(path)?,
            path: path.to_path_buf(),
            echo,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSink for TeeSink {
    fn line(&mut self, line: &str) -> io::Result<()> {
        match &mut self.echo {
            Target::Stdout => println!("{line}"),
            Target::Silent => {}
            Target::Spinner(bar) => bar.set_message(line.chars().take(100).collect::<String>()),
            Target::File(file) => writeln!(file, "{line}")?,
        }
        writeln!(self.log, "{line}")
    }
}
