use super::Reply;
use crate::{
    allowlist::{self, Verdict},
    metrics::TERMINAL_COMMANDS,
    runner::Invocation,
    web::{AppContext, error::ApiError, session::AdminUser},
};
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use std::{env, sync::Arc, time::Duration};

const SHELL_TIMEOUT: Duration = Duration::from_secs(120);
const CLI_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
pub struct Execute {
    #[serde(default)]
    pub command: String,
}

fn invocation(verdict: Verdict, command: &str, os_user: &str) -> Result<Invocation, ApiError> {
    match verdict {
        Verdict::Shell => Ok(Invocation::new("bash")
            .args(["-c".to_string(), allowlist::shell_line(command)])
            .as_user(os_user)
            .timeout(SHELL_TIMEOUT)),
        Verdict::CliPassthrough => {
            let exe = env::current_exe().map_err(crate::Error::from)?;
            Ok(Invocation::new(exe.to_string_lossy())
                .args(command.split_whitespace().skip(1))
                .timeout(CLI_TIMEOUT))
        }
    }
}

/// Allow-listed command, run through the same runner as everything else.
pub async fn execute(
    State(app): State<Arc<AppContext>>,
    admin: AdminUser,
    Json(form): Json<Execute>,
) -> Reply {
    let command = form.command;
    let verdict = match allowlist::check(&command) {
        Ok(verdict) => verdict,
        Err(rejection) => {
            TERMINAL_COMMANDS.with_label_values(&["rejected"]).inc();
            tracing::warn!(user = %admin.username, command, "terminal command rejected");
            return Err(ApiError::BadRequest(rejection.to_string()));
        }
    };

    let label = match verdict {
        Verdict::Shell => "shell",
        Verdict::CliPassthrough => "cli",
    };
    TERMINAL_COMMANDS.with_label_values(&[label]).inc();
    tracing::info!(user = %admin.username, command, "terminal command");

    let invocation = invocation(verdict, &command, &app.config.oracle.os_user)?;
    let captured = app
        .run("terminal", move |ctx| ctx.executor().capture(&invocation))
        .await?;
    Ok(Json(json!({
        "success": captured.success(),
        "exit_code": captured.exit_code,
        "output": captured.output,
    })))
}
