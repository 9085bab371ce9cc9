use super::{Reply, ok};
use crate::{
    metrics::LOGIN_ATTEMPTS,
    web::{
        AppContext,
        error::ApiError,
        session::{SessionUser, clear_cookie, set_cookie},
    },
};
use axum::{
    Json,
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::task;

#[derive(Debug, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(app): State<Arc<AppContext>>,
    Json(form): Json<Login>,
) -> Result<impl IntoResponse, ApiError> {
    let state = app.clone();
    let username = form.username.clone();
    let user = task::spawn_blocking(move || {
        state.credentials.authenticate(&form.username, &form.password)
    })
    .await??;

    let Some(user) = user else {
        LOGIN_ATTEMPTS.with_label_values(&["failure"]).inc();
        tracing::warn!(user = %username, "login failed");
        return Err(ApiError::InvalidCredentials);
    };

    LOGIN_ATTEMPTS.with_label_values(&["success"]).inc();
    tracing::info!(user = %user.username, "login");
    let id = app.sessions.create(&user);
    Ok((
        AppendHeaders([(header::SET_COOKIE, set_cookie(&id))]),
        ok(json!({
            "username": user.username,
            "role": user.role,
            "must_change_password": user.must_change_password,
        })),
    ))
}

pub async fn logout(
    State(app): State<Arc<AppContext>>,
    user: SessionUser,
) -> impl IntoResponse {
    app.sessions.remove(&user.session_id);
    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie())]),
        ok(json!({ "message": "Logged out successfully" })),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub async fn change_password(
    State(app): State<Arc<AppContext>>,
    user: SessionUser,
    Json(form): Json<ChangePassword>,
) -> Reply {
    let state = app.clone();
    let username = user.username.clone();
    let changed = task::spawn_blocking(move || {
        state.credentials.change_password(
            &username,
            &form.current_password,
            &form.new_password,
            &form.confirm_password,
        )
    })
    .await??;

    changed.map_err(|rule| ApiError::BadRequest(rule.to_string()))?;
    app.sessions.password_changed(&user.session_id);
    Ok(ok(json!({ "message": "Password changed successfully" })))
}

pub async fn profile(State(app): State<Arc<AppContext>>, user: SessionUser) -> Reply {
    let username = user.username.clone();
    let record = task::spawn_blocking(move || app.credentials.get(&username))
        .await??
        .ok_or(ApiError::Unauthorized)?;

    Ok(ok(json!({
        "username": record.username,
        "role": record.role,
        "must_change_password": user.must_change_password,
        "created_at": record.created_at,
        "password_changed_at": record.password_changed_at,
    })))
}
