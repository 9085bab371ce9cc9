use super::{Reply, ok, output, started};
use crate::{
    ops::{
        flashback::{self, Target},
        protection,
        rman::{self, BackupKind},
    },
    web::{
        AppContext,
        error::ApiError,
        session::{AdminUser, CurrentUser},
    },
};
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub async fn status(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let status = app.run("protection_status", protection::status).await?;
    Ok(ok(json!({
        "log_mode": status.log_mode,
        "flashback_on": status.flashback_on,
        "fra": status.fra,
    })))
}

pub async fn enable_archivelog(State(app): State<Arc<AppContext>>, _admin: AdminUser) -> Reply {
    let outcome = app
        .run("archivelog_enable", protection::enable_archivelog)
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnableFra {
    pub size: Option<String>,
    pub dest: Option<String>,
}

pub async fn enable_fra(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<EnableFra>,
) -> Reply {
    let size = form
        .size
        .unwrap_or_else(|| protection::DEFAULT_FRA_SIZE.to_string());
    let outcome = app
        .run("fra_enable", move |ctx| {
            protection::enable_fra(ctx, &size, form.dest.as_deref())
        })
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnableFlashback {
    pub retention_minutes: Option<u32>,
}

pub async fn enable_flashback(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<EnableFlashback>,
) -> Reply {
    let minutes = form
        .retention_minutes
        .unwrap_or(flashback::DEFAULT_RETENTION_MINUTES);
    let outcome = app
        .run("flashback_enable", move |ctx| flashback::enable(ctx, minutes))
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RmanConfigure {
    pub retention_days: u32,
    pub compression: bool,
}

impl Default for RmanConfigure {
    fn default() -> Self {
        Self {
            retention_days: 7,
            compression: true,
        }
    }
}

pub async fn rman_configure(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<RmanConfigure>,
) -> Reply {
    let outcome = app
        .run("rman_setup", move |ctx| {
            rman::setup(ctx, form.retention_days, form.compression)
        })
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RmanBackup {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub tag: Option<String>,
}

pub async fn rman_backup(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<RmanBackup>,
) -> Reply {
    let kind: BackupKind = form.kind.as_deref().unwrap_or("full").parse()?;
    let tag = form.tag;
    let record = app.job(
        &format!("rman-{kind}"),
        app.config.clone(),
        move |ctx, _| rman::backup(ctx, kind, tag.as_deref()),
    );
    Ok(started(&record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlashbackDatabase {
    pub scn: Option<u64>,
    pub timestamp: Option<String>,
}

pub async fn flashback_database(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<FlashbackDatabase>,
) -> Reply {
    let target = match (form.scn, form.timestamp.as_deref()) {
        (Some(scn), _) => Target::Scn(scn),
        (None, Some(ts)) if !ts.trim().is_empty() => ts.parse()?,
        _ => return Err(ApiError::BadRequest("Provide SCN or timestamp".to_string())),
    };
    let outcome = app
        .run("flashback_restore", move |ctx| flashback::restore(ctx, target))
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Deserialize)]
pub struct FlashbackTable {
    pub table: String,
    pub timestamp: String,
}

pub async fn flashback_table(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<FlashbackTable>,
) -> Reply {
    let outcome = app
        .run("flashback_table", move |ctx| {
            flashback::flashback_table(ctx, &form.table, &form.timestamp)
        })
        .await?;
    Ok(output(&outcome))
}
