//! Route table. Every handler answers JSON with a `success` flag.

mod auth;
mod cluster;
mod databases;
mod installation;
mod jobs;
mod labs;
mod protection;
mod security;
mod storage;
mod system;
mod terminal;

use super::AppContext;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

type Reply = Result<Json<Value>, super::error::ApiError>;

fn ok(mut body: Value) -> Json<Value> {
    if let Some(fields) = body.as_object_mut() {
        fields.insert("success".to_string(), Value::Bool(true));
    }
    Json(body)
}

fn output(outcome: &crate::ops::Outcome) -> Json<Value> {
    ok(json!({ "message": outcome.summary, "output": outcome.output }))
}

fn started(record: &super::jobs::JobRecord) -> Json<Value> {
    ok(json!({
        "job_id": record.id,
        "log": record.log_path,
        "message": format!("{} started", record.name),
    }))
}

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/change-password", post(auth::change_password))
        .route("/api/profile", get(auth::profile))
        .route("/api/system-status", get(system::status))
        .route("/api/databases/list", get(databases::list))
        .route("/api/databases/create", post(databases::create))
        .route("/api/databases/pdb/create", post(databases::pdb_create))
        .route("/api/databases/pdb/{name}/open", post(databases::pdb_open))
        .route("/api/databases/pdb/{name}/close", post(databases::pdb_close))
        .route("/api/databases/pdb/{name}/drop", post(databases::pdb_drop))
        .route("/api/storage/tablespaces", get(storage::tablespaces))
        .route("/api/storage/tablespace/create", post(storage::create_tablespace))
        .route("/api/storage/tablespace/{name}/drop", post(storage::drop_tablespace))
        .route("/api/storage/controlfiles", get(storage::controlfiles))
        .route("/api/storage/redologs", get(storage::redo_logs))
        .route("/api/storage/redolog/add", post(storage::add_redo_log))
        .route("/api/protection/status", get(protection::status))
        .route("/api/protection/archivelog/enable", post(protection::enable_archivelog))
        .route("/api/protection/fra/enable", post(protection::enable_fra))
        .route("/api/protection/flashback/enable", post(protection::enable_flashback))
        .route("/api/rman/configure", post(protection::rman_configure))
        .route("/api/rman/backup", post(protection::rman_backup))
        .route("/api/flashback/database", post(protection::flashback_database))
        .route("/api/flashback/table", post(protection::flashback_table))
        .route("/api/security/users", get(security::users))
        .route("/api/security/user/create", post(security::create_user))
        .route("/api/security/user/{name}/lock", post(security::lock_user))
        .route("/api/security/user/{name}/unlock", post(security::unlock_user))
        .route("/api/security/user/{name}/drop", post(security::drop_user))
        .route("/api/security/grant", post(security::grant))
        .route("/api/security/profile/create", post(security::create_profile))
        .route("/api/security/audit", post(security::audit))
        .route("/api/security/audit/trail", get(security::audit_trail))
        .route("/api/cluster/nodes", get(cluster::nodes))
        .route("/api/cluster/asm", get(cluster::asm))
        .route("/api/labs", get(labs::list))
        .route("/api/labs/run", post(labs::run))
        .route("/api/labs/run-sequence", post(labs::run_sequence))
        .route("/api/installation/precheck", get(installation::precheck))
        .route("/api/installation/system", post(installation::system))
        .route("/api/installation/binaries", post(installation::binaries))
        .route("/api/installation/database", post(installation::database))
        .route("/api/installation/quick", post(installation::quick))
        .route("/api/installation/logs", get(installation::logs))
        .route("/api/jobs", get(jobs::list))
        .route("/api/jobs/{id}", get(jobs::get))
        .route("/api/terminal/execute", post(terminal::execute))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::{
        config::Config,
        ops::testing::RecordingExecutor,
        web::{
            auth::{Role, UserRecord},
            router,
        },
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use std::{path::Path, time::Duration};
    use tower::ServiceExt;

    struct Panel {
        app: Arc<AppContext>,
        exec: Arc<RecordingExecutor>,
        _dir: tempfile::TempDir,
    }

    impl Panel {
        fn new(exec: RecordingExecutor) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::default()
                .with_log_dir(dir.path().join("logs"))
                .with_state_dir(dir.path().join("state"))
                .with_scripts_dir(dir.path().join("scripts"));
            let exec = Arc::new(exec);
            let app = Arc::new(AppContext::new(config, exec.clone()).unwrap());
            Self {
                app,
                exec,
                _dir: dir,
            }
        }

        fn cookie(&self, role: Role, must_change: bool) -> String {
            let id = self.app.sessions.create(&UserRecord {
                username: "tester".to_string(),
                role,
                password_hash: String::new(),
                salt: None,
                must_change_password: must_change,
                created_at: String::new(),
                password_changed_at: None,
            });
            format!("oradba_session={id}")
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            cookie: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value, Option<String>) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(cookie) = cookie {
                request = request.header(header::COOKIE, cookie);
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = router(self.app.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let set_cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .map(|value| value.to_str().unwrap().to_string());
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value, set_cookie)
        }
    }

    fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
        value.get(key).unwrap_or(&Value::Null)
    }

    #[tokio::test]
    async fn test_requires_login() {
        let panel = Panel::new(RecordingExecutor::default());
        let (status, body, _) = panel.call("GET", "/api/system-status", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(field(&body, "success"), &json!(false));

        let (status, _, _) = panel
            .call("GET", "/api/jobs", Some("oradba_session=forged"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_and_forced_password_change() {
        let panel = Panel::new(RecordingExecutor::default());

        let (status, body, _) = panel
            .call(
                "POST",
                "/login",
                None,
                Some(json!({"username": "admin", "password": "nope"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(field(&body, "error"), &json!("Invalid credentials"));

        let (status, body, set_cookie) = panel
            .call(
                "POST",
                "/login",
                None,
                Some(json!({"username": "admin", "password": "admin123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "must_change_password"), &json!(true));
        let set_cookie = set_cookie.unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        let cookie = set_cookie.split(';').next().unwrap().to_string();

        let (status, body, _) = panel
            .call("GET", "/api/storage/tablespaces", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(field(&body, "error"), &json!("Password change required"));

        let (status, body, _) = panel.call("GET", "/api/profile", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "role"), &json!("admin"));

        let (status, body, _) = panel
            .call(
                "POST",
                "/change-password",
                Some(&cookie),
                Some(json!({
                    "current_password": "admin123",
                    "new_password": "Welcome2024",
                    "confirm_password": "Welcome2025",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(field(&body, "error"), &json!("Passwords do not match"));

        let (status, _, _) = panel
            .call(
                "POST",
                "/change-password",
                Some(&cookie),
                Some(json!({
                    "current_password": "admin123",
                    "new_password": "Welcome2024",
                    "confirm_password": "Welcome2024",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body, _) = panel
            .call("GET", "/api/storage/tablespaces", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "tablespaces"), &json!([]));

        let (status, _, _) = panel.call("POST", "/logout", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = panel.call("GET", "/api/profile", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_routes_reject_plain_users() {
        let panel = Panel::new(RecordingExecutor::default());
        let cookie = panel.cookie(Role::User, false);

        let (status, body, _) = panel
            .call("POST", "/api/security/user/SCOTT/drop", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(field(&body, "error"), &json!("Admin privileges required"));
        assert!(panel.exec.calls().is_empty());

        for (method, uri) in [
            ("POST", "/api/databases/pdb/SALESPDB/open"),
            ("POST", "/api/databases/pdb/SALESPDB/close"),
            ("GET", "/api/installation/precheck"),
            ("GET", "/api/installation/logs"),
            ("GET", "/api/installation/logs?name=install.log"),
        ] {
            let (status, _, _) = panel.call(method, uri, Some(&cookie), None).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
        }
        assert!(panel.exec.calls().is_empty());

        let (status, _, _) = panel.call("GET", "/api/labs", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pdb_routes_validate_and_run() {
        let panel = Panel::new(RecordingExecutor::default());
        let cookie = panel.cookie(Role::Admin, false);

        let (status, _, _) = panel
            .call("POST", "/api/databases/pdb/1BAD/open", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(panel.exec.calls().is_empty());

        let (status, body, _) = panel
            .call("POST", "/api/databases/pdb/SALESPDB/open", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "message"), &json!("PDB SALESPDB opened"));
        assert!(
            panel
                .exec
                .scripts()
                .concat()
                .contains("ALTER PLUGGABLE DATABASE SALESPDB OPEN;")
        );
    }

    #[tokio::test]
    async fn test_tool_failure_maps_to_500_with_output() {
        let panel = Panel::new(RecordingExecutor::default().respond(
            "CLOSE IMMEDIATE",
            1,
            "ORA-65020: pluggable database already closed\n",
        ));
        let cookie = panel.cookie(Role::Admin, false);
        let (status, body, _) = panel
            .call("POST", "/api/databases/pdb/HRPDB/close", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(field(&body, "success"), &json!(false));
        assert!(field(&body, "output").as_str().unwrap().contains("ORA-65020"));
    }

    #[tokio::test]
    async fn test_input_errors() {
        let panel = Panel::new(RecordingExecutor::default());
        let cookie = panel.cookie(Role::Admin, false);

        let (status, body, _) = panel
            .call("POST", "/api/flashback/database", Some(&cookie), Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(field(&body, "error"), &json!("Provide SCN or timestamp"));

        let (status, body, _) = panel
            .call(
                "POST",
                "/api/security/user/create",
                Some(&cookie),
                Some(json!({"username": "app", "password": "abc"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            field(&body, "error"),
            &json!("Password must be at least 4 characters.")
        );

        let (status, _, _) = panel
            .call(
                "POST",
                "/api/databases/create",
                Some(&cookie),
                Some(json!({"sid": "9prod"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(panel.exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_gate() {
        let panel = Panel::new(RecordingExecutor::default().respond(
            "lsnrctl status",
            0,
            "The command completed successfully\n",
        ));
        let cookie = panel.cookie(Role::Admin, false);

        let (status, body, _) = panel
            .call(
                "POST",
                "/api/terminal/execute",
                Some(&cookie),
                Some(json!({"command": "ls; rm -rf /"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            field(&body, "error")
                .as_str()
                .unwrap()
                .starts_with("Shell metacharacters")
        );
        assert!(panel.exec.calls().is_empty());

        for (command, error) in [
            ("", "No command provided"),
            ("   ", "Command not allowed."),
        ] {
            let (status, body, _) = panel
                .call(
                    "POST",
                    "/api/terminal/execute",
                    Some(&cookie),
                    Some(json!({ "command": command })),
                )
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(field(&body, "error").as_str().unwrap().starts_with(error));
        }
        assert!(panel.exec.calls().is_empty());

        let (status, body, _) = panel
            .call(
                "POST",
                "/api/terminal/execute",
                Some(&cookie),
                Some(json!({"command": "lsnrctl status"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "success"), &json!(true));
        let calls = panel.exec.calls();
        let call = calls.first().unwrap();
        assert_eq!(call.program, "bash");
        assert_eq!(call.user.as_deref(), Some("oracle"));
        assert_eq!(call.timeout, Some(Duration::from_secs(120)));
    }

    async fn wait_for_job(panel: &Panel, cookie: &str, id: &str) -> Value {
        for _ in 0..200 {
            let (status, body, _) = panel
                .call("GET", &format!("/api/jobs/{id}"), Some(cookie), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            let job = field(&body, "job").clone();
            if field(field(&job, "status"), "state") != &json!("running") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn test_lab_job_lifecycle() {
        let panel = Panel::new(RecordingExecutor::default());
        let cookie = panel.cookie(Role::Admin, false);
        let scripts = panel.app.config.paths.scripts_dir.clone();
        std::fs::create_dir_all(&scripts).unwrap();
        let lab = crate::ops::labs::find(5).unwrap();
        std::fs::write(scripts.join(lab.script), "#!/bin/bash\necho ok\n").unwrap();

        let (status, body, _) = panel
            .call("POST", "/api/labs/run", Some(&cookie), Some(json!({"number": "05"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = field(&body, "job_id").as_str().unwrap().to_string();

        let body = wait_for_job(&panel, &cookie, &id).await;
        let job = field(&body, "job");
        assert_eq!(field(field(job, "status"), "state"), &json!("succeeded"));
        let log = field(job, "log_path").as_str().unwrap();
        assert!(Path::new(log).starts_with(panel.app.log_dir()));

        let (status, body, _) = panel.call("GET", "/api/jobs", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "jobs").as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_script_fails_job_and_unknown_jobs_404() {
        let panel = Panel::new(RecordingExecutor::default());
        let cookie = panel.cookie(Role::Admin, false);

        let (_, body, _) = panel
            .call("POST", "/api/labs/run", Some(&cookie), Some(json!({"number": "07"})))
            .await;
        let id = field(&body, "job_id").as_str().unwrap().to_string();
        let body = wait_for_job(&panel, &cookie, &id).await;
        let status = field(field(&body, "job"), "status");
        assert_eq!(field(status, "state"), &json!("failed"));
        assert!(
            field(status, "error")
                .as_str()
                .unwrap()
                .starts_with("script not found")
        );

        let (status, _, _) = panel
            .call("GET", "/api/jobs/not-a-uuid", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body, _) = panel
            .call(
                "GET",
                &format!("/api/jobs/{}", uuid::Uuid::new_v4()),
                Some(&cookie),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(field(&body, "error"), &json!("Job not found"));
    }

    #[tokio::test]
    async fn test_installation_logs_listing_and_tail() {
        let panel = Panel::new(RecordingExecutor::default());
        let cookie = panel.cookie(Role::Admin, false);
        let logs = panel.app.log_dir().to_path_buf();
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("dbca.log"), "line 1\nline 2\nline 3\n").unwrap();
        std::fs::write(logs.join("notes.txt"), "ignored").unwrap();

        let (status, body, _) = panel
            .call("GET", "/api/installation/logs", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let files = field(&body, "logs").as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(field(files.first().unwrap(), "name"), &json!("dbca.log"));

        let (status, body, _) = panel
            .call(
                "GET",
                "/api/installation/logs?name=dbca.log&lines=2",
                Some(&cookie),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(field(&body, "lines"), &json!(["line 2", "line 3"]));

        let (status, _, _) = panel
            .call(
                "GET",
                "/api/installation/logs?name=..%2Fstate%2Fgui_users.json",
                Some(&cookie),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_route_is_public() {
        let panel = Panel::new(RecordingExecutor::default());
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = router(panel.app.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
