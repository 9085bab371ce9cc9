use super::{Reply, ok, started};
use crate::{
    ops::{
        Outcome, database,
        install::{self, InstallOptions},
        precheck,
    },
    sequencer::AutoConfirm,
    web::{
        AppContext,
        error::ApiError,
        session::AdminUser,
    },
};
use axum::extract::{Query, State};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fs::File, path::Path, sync::Arc};
use tokio::task;

pub async fn precheck(State(app): State<Arc<AppContext>>, _admin: AdminUser) -> Reply {
    let report = app
        .run("precheck", |ctx| {
            Ok(precheck::evaluate(&precheck::gather(ctx.executor())))
        })
        .await?;
    Ok(ok(json!({
        "passed": report.passed(),
        "lines": report.render(),
        "report": report,
    })))
}

pub async fn system(State(app): State<Arc<AppContext>>, _admin: AdminUser) -> Reply {
    let record = app.job("install-system", app.config.clone(), |ctx, _| {
        install::install_system(ctx)
    });
    Ok(started(&record))
}

pub async fn binaries(State(app): State<Arc<AppContext>>, _admin: AdminUser) -> Reply {
    let record = app.job("install-binaries", app.config.clone(), |ctx, _| {
        install::install_binaries(ctx)
    });
    Ok(started(&record))
}

pub async fn database(State(app): State<Arc<AppContext>>, _admin: AdminUser) -> Reply {
    let record = app.job("install-database", app.config.clone(), |ctx, _| {
        install::create_database(ctx)
    });
    Ok(started(&record))
}

/// The whole plan, auto-confirmed, with the banners in the job log.
pub async fn quick(State(app): State<Arc<AppContext>>, _admin: AdminUser) -> Reply {
    let record = app.job("install-quick", app.config.clone(), |ctx, log| {
        let mut out = File::options().create(true).append(true).open(log)?;
        install::install_all(ctx, &InstallOptions::default(), &mut AutoConfirm, &mut out)?
            .into_result()?;
        Ok(Outcome::new("Installation complete"))
    });
    Ok(started(&record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    pub name: Option<String>,
    pub lines: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogFile {
    name: String,
    size: u64,
    modified: Option<String>,
}

fn log_files(dir: &Path) -> std::io::Result<Vec<LogFile>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in dir.read_dir()? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata()?;
        if !meta.is_file() || !name.ends_with(".log") {
            continue;
        }
        files.push(LogFile {
            name,
            size: meta.len(),
            modified: meta.modified().ok().map(|time| {
                DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
            }),
        });
    }
    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(files)
}

/// Without `name`, the log files; with it, that file's tail.
pub async fn logs(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Query(query): Query<LogQuery>,
) -> Reply {
    let dir = app.log_dir().to_path_buf();

    let Some(name) = query.name else {
        let files = task::spawn_blocking(move || log_files(&dir))
            .await?
            .map_err(crate::Error::from)?;
        return Ok(ok(json!({ "logs": files })));
    };

    if name.is_empty() || name.contains('/') || name.contains("..") {
        return Err(ApiError::BadRequest("Invalid log name".to_string()));
    }
    let path = dir.join(&name);
    if !path.is_file() {
        return Err(ApiError::NotFound(format!("Log {name} not found")));
    }
    let lines = query.lines.unwrap_or(database::DEFAULT_TAIL_LINES);
    let tail = task::spawn_blocking(move || database::tail(&path, lines)).await??;
    Ok(ok(json!({ "name": name, "lines": tail })))
}
