//! Long-running work started from the web panel.
//!
//! Each job runs on the blocking pool and writes to its own log file; the
//! registry keeps the record so the browser can poll status and progress.

use crate::{error::Result, metrics::JOBS_RUNNING, ops::Outcome};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use regex::Regex;
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError},
};
use tokio::task;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log_path: PathBuf,
    pub status: JobStatus,
}

impl JobRecord {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

type Pattern = LazyLock<std::result::Result<Regex, regex::Error>>;

static STEP: Pattern = LazyLock::new(|| Regex::new(r"Step (\d+)/(\d+)"));
static STEP_DONE: Pattern = LazyLock::new(|| Regex::new(r"✓ Step (\d+) complete"));
static STEP_FAILED: Pattern = LazyLock::new(|| Regex::new(r"✗ Step (\d+) FAILED"));

/// Sequencer progress read back from a job log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: Option<u32>,
    pub total: Option<u32>,
    pub completed: Vec<u32>,
    pub failed: Option<u32>,
    pub finished: bool,
}

fn captures(pattern: &Pattern, text: &str) -> Vec<Vec<u32>> {
    let Ok(re) = pattern.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .map(|caps| {
            caps.iter()
                .skip(1)
                .filter_map(|group| group.and_then(|m| m.as_str().parse().ok()))
                .collect()
        })
        .collect()
}

#[must_use]
pub fn progress(log: &str) -> Progress {
    let mut progress = Progress::default();
    if let Some(last) = captures(&STEP, log).last() {
        progress.current = last.first().copied();
        progress.total = last.get(1).copied();
    }
    progress.completed = captures(&STEP_DONE, log)
        .iter()
        .filter_map(|groups| groups.first().copied())
        .collect();
    progress.failed = captures(&STEP_FAILED, log)
        .last()
        .and_then(|groups| groups.first().copied());
    progress.finished = log.contains("Installation Complete");
    progress
}

/// Running and finished jobs, newest first when listed.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, JobRecord>>>,
    log_dir: PathBuf,
}

impl JobRegistry {
    #[must_use]
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            log_dir,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<Uuid, JobRecord>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start `work` in the background. It receives the job log path.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, name: &str, work: F) -> JobRecord
    where
        F: FnOnce(&Path) -> Result<Outcome> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let log_path = self.log_dir.join(format!("job-{name}-{}.log", id.simple()));
        let record = JobRecord {
            id,
            name: name.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            log_path: log_path.clone(),
            status: JobStatus::Running,
        };
        self.jobs().insert(id, record.clone());
        JOBS_RUNNING.inc();
        tracing::info!(job = %id, name, log = %log_path.display(), "job started");

        let registry = self.clone();
        task::spawn(async move {
            let log = log_path.clone();
            let result = AssertUnwindSafe(task::spawn_blocking(move || work(&log)))
                .catch_unwind()
                .await;

            let status = match result {
                Ok(Ok(Ok(outcome))) => {
                    append(&log_path, &format!("Job succeeded: {}", outcome.summary));
                    JobStatus::Succeeded
                }
                Ok(Ok(Err(err))) => {
                    append(&log_path, &format!("Job failed: {err}"));
                    JobStatus::Failed {
                        error: err.to_string(),
                    }
                }
                Ok(Err(join)) => JobStatus::Failed {
                    error: format!("job aborted: {join}"),
                },
                Err(_) => JobStatus::Failed {
                    error: "job panicked".to_string(),
                },
            };
            registry.finish(id, status);
        });

        record
    }

    fn finish(&self, id: Uuid, status: JobStatus) {
        JOBS_RUNNING.dec();
        if let Some(record) = self.jobs().get_mut(&id) {
            match &status {
                JobStatus::Failed { error } => {
                    tracing::warn!(job = %id, name = %record.name, error, "job failed");
                }
                _ => tracing::info!(job = %id, name = %record.name, "job finished"),
            }
            record.status = status;
            record.finished_at = Some(Utc::now());
        }
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs().get(&id).cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs().values().cloned().collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }
}

fn append(path: &Path, line: &str) {
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| File::options().create(true).append(true).open(path))
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(err) = written {
        tracing::warn!(path = %path.display(), error = %err, "could not write job log");
    }
}
