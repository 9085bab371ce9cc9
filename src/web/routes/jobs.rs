use super::{Reply, ok};
use crate::{
    runner::tail_lines,
    web::{AppContext, error::ApiError, jobs::progress, session::CurrentUser},
};
use axum::extract::{Path, State};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const LOG_TAIL_LINES: usize = 50;

pub async fn list(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    Ok(ok(json!({ "jobs": app.jobs.list() })))
}

/// Record, parsed progress and the end of the log.
pub async fn get(
    State(app): State<Arc<AppContext>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Reply {
    let record = Uuid::parse_str(&id)
        .ok()
        .and_then(|id| app.jobs.get(id))
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    let log = tokio::fs::read_to_string(&record.log_path)
        .await
        .unwrap_or_default();

    Ok(ok(json!({
        "progress": progress(&log),
        "log": tail_lines(&log, LOG_TAIL_LINES),
        "job": record,
    })))
}
