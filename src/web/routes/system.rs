use super::{Reply, ok};
use crate::{
    ops::detect,
    web::{AppContext, session::CurrentUser},
};
use axum::extract::State;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;

pub async fn status(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let detection = app.run("system_status", detect::detect).await?;
    Ok(ok(json!({
        "hostname": detect::hostname(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "oracle_sid": app.config.database.sid,
        "checks": {
            "oracle_installed": detection.home_exists && detection.binaries_present(),
            "database_running": !detection.processes.instances.is_empty(),
            "listener_running": detection.processes.listener,
            "grid_installed": detection.grid_installed,
            "asm_running": detection.processes.asm,
        },
        "detection": detection,
    })))
}
