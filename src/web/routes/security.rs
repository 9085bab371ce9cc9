use super::{Reply, ok, output};
use crate::{
    ops::security,
    web::{
        AppContext,
        error::ApiError,
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

const MIN_USER_PASSWORD_LEN: usize = 4;

pub async fn users(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let table = app.run("security_users", security::list_users).await?;
    Ok(ok(json!({ "users": table.records() })))
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tablespace: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

pub async fn create_user(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<CreateUser>,
) -> Reply {
    if form.password.chars().count() < MIN_USER_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Password must be at least 4 characters.".to_string(),
        ));
    }
    let username = form.username.trim().to_uppercase();
    let tablespace = form
        .tablespace
        .unwrap_or_else(|| security::DEFAULT_TABLESPACE.to_string());
    let profile = form
        .profile
        .unwrap_or_else(|| security::DEFAULT_PROFILE.to_string());
    let outcome = app
        .run("security_create_user", move |ctx| {
            security::create_user(ctx, &username, &form.password, &tablespace, &profile)
        })
        .await?;
    Ok(output(&outcome))
}

pub async fn lock_user(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app
        .run("security_lock", move |ctx| security::lock_user(ctx, &name))
        .await?;
    Ok(output(&outcome))
}

pub async fn unlock_user(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app
        .run("security_unlock", move |ctx| security::unlock_user(ctx, &name))
        .await?;
    Ok(output(&outcome))
}

pub async fn drop_user(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Reply {
    let outcome = app
        .run("security_drop_user", move |ctx| security::drop_user(ctx, &name))
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Deserialize)]
pub struct Grant {
    pub privilege: String,
    pub user: String,
}

pub async fn grant(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<Grant>,
) -> Reply {
    let outcome = app
        .run("security_grant", move |ctx| {
            security::grant(ctx, &form.privilege, &form.user)
        })
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Deserialize)]
pub struct CreateProfile {
    pub name: String,
}

pub async fn create_profile(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<CreateProfile>,
) -> Reply {
    let outcome = app
        .run("security_profile", move |ctx| {
            security::create_profile(ctx, &form.name)
        })
        .await?;
    Ok(output(&outcome))
}

#[derive(Debug, Deserialize)]
pub struct Audit {
    pub enable: bool,
}

pub async fn audit(
    State(app): State<Arc<AppContext>>,
    _admin: AdminUser,
    Json(form): Json<Audit>,
) -> Reply {
    let outcome = app
        .run("security_audit", move |ctx| security::audit(ctx, form.enable))
        .await?;
    Ok(output(&outcome))
}

pub async fn audit_trail(State(app): State<Arc<AppContext>>, _user: CurrentUser) -> Reply {
    let table = app.run("security_audit_trail", security::audit_trail).await?;
    Ok(ok(json!({ "records": table.records() })))
}
