use super::{Reply, ok, output, started};
use crate::{
    ops::{install, pdb},
    validation,
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

const INSTANCE_SQL: &str =
    "SELECT instance_name, status, database_status FROM v$instance;";

pub async fn list(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let (instance, pdbs) = app
        .run("databases_list", |ctx| {
            let instance = ctx.sql().table(INSTANCE_SQL)?;
            Ok((instance.records(), pdb::list(ctx)?))
        })
        .await?;
    Ok(ok(json!({
        "cdb": instance.first().cloned().unwrap_or_default(),
        "pdbs": pdbs,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateDatabase {
    pub sid: String,
}

/// DBCA runs for tens of minutes, so it becomes a job.
pub async fn create(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<CreateDatabase>,
) -> Reply {
    let sid = form.sid.trim().to_uppercase();
    validation::identifier("SID", &sid)?;
    let config = app.config.clone().with_db_name(&sid);
    let record = app.job(&format!("dbca-{sid}"), config, |ctx, _| {
        install::create_database(ctx)
    });
    Ok(started(&record))
}

#[derive(Debug, Deserialize)]
pub struct CreatePdb {
    pub name: String,
    #[serde(default)]
    pub admin_user: Option<String>,
    pub admin_password: String,
}

pub async fn pdb_create(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<CreatePdb>,
) -> Reply {
    let admin_user = form
        .admin_user
        .unwrap_or_else(|| pdb::DEFAULT_ADMIN_USER.to_string());
    let outcome = app
        .run("pdb_create", move |ctx| {
            pdb::create(ctx, &form.name, &admin_user, &form.admin_password)
        })
        .await?;
    Ok(output(&outcome))
}

pub async fn pdb_open(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app.run("pdb_open", move |ctx| pdb::open(ctx, &name)).await?;
    Ok(output(&outcome))
}

pub async fn pdb_close(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app
        .run("pdb_close", move |ctx| pdb::close(ctx, &name))
        .await?;
    Ok(output(&outcome))
}

pub async fn pdb_drop(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app
        .run("pdb_drop", move |ctx| pdb::drop(ctx, &name, true))
        .await?;
    Ok(output(&outcome))
}
