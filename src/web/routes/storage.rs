use super::{Reply, ok, output};
use crate::{
    ops::storage,
    web::{
        AppContext,
        session::{AdminUser, CurrentUser},
    },
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub async fn tablespaces(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let tablespaces = app.run("storage_tablespaces", storage::tablespaces).await?;
    Ok(ok(json!({ "tablespaces": tablespaces })))
}

fn default_tablespace_size() -> String {
    "100M".to_string()
}

const fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateTablespace {
    pub name: String,
    #[serde(default = "default_tablespace_size")]
    pub size: String,
    #[serde(default = "yes")]
    pub autoextend: bool,
}

pub async fn create_tablespace(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<CreateTablespace>,
) -> Reply {
    let outcome = app
        .run("storage_create_tablespace", move |ctx| {
            storage::create_tablespace(ctx, &form.name, &form.size, form.autoextend)
        })
        .await?;
    Ok(output(&outcome))
}

pub async fn drop_tablespace(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app
        .run("storage_drop_tablespace", move |ctx| {
            storage::drop_tablespace(ctx, &name)
        })
        .await?;
    Ok(output(&outcome))
}

pub async fn controlfiles(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let table = app.run("storage_controlfiles", storage::controlfiles).await?;
    Ok(ok(json!({ "controlfiles": table.records() })))
}

pub async fn redo_logs(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let table = app.run("storage_redologs", storage::redo_logs).await?;
    Ok(ok(json!({ "redologs": table.records() })))
}

fn default_redo_size() -> String {
    "200M".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AddRedoLog {
    #[serde(default = "default_redo_size")]
    pub size: String,
}

pub async fn add_redo_log(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<AddRedoLog>,
) -> Reply {
    let outcome = app
        .run("storage_redo_add", move |ctx| storage::add_redo_log(ctx, &form.size))
        .await?;
    Ok(output(&outcome))
}
