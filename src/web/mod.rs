//! JSON control panel over the same operations as the command line.

pub mod auth;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod session;

use crate::{
    config::Config,
    metrics::encode_metrics,
    ops::{self, Context, Outcome},
    runner::{Echo, Executor},
};
use anyhow::Context as _;
use auth::CredentialStore;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use error::ApiError;
use jobs::{JobRecord, JobRegistry};
use session::SessionStore;
use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, task};

/// Shared state of every request handler.
pub struct AppContext {
    pub config: Config,
    pub exec: Arc<dyn Executor>,
    pub credentials: CredentialStore,
    pub sessions: SessionStore,
    pub jobs: JobRegistry,
}

impl AppContext {
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be opened
    pub fn new(config: Config, exec: Arc<dyn Executor>) -> crate::Result<Self> {
        let credentials = CredentialStore::open(&config.web.state_dir)?;
        let sessions = SessionStore::new(Duration::from_secs(config.web.session_timeout));
        let jobs = JobRegistry::new(config.paths.log_dir.clone());
        Ok(Self {
            config,
            exec,
            credentials,
            sessions,
            jobs,
        })
    }

    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.config.paths.log_dir
    }

    fn context(&self, config: Config, echo: Echo) -> Context {
        Context::new(config, self.exec.clone()).with_echo(echo)
    }

    /// Run an operation on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or `Internal` if the task died
    pub async fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Context) -> crate::Result<T> + Send + 'static,
    {
        let ctx = self.context(self.config.clone(), Echo::Silent);
        let result = task::spawn_blocking(move || ops::measured(operation, || work(&ctx))).await?;
        Ok(result?)
    }

    /// Start an operation as a background job whose tool output is copied
    /// into the job log.
    pub fn job<F>(&self, name: &str, config: Config, work: F) -> JobRecord
    where
        F: FnOnce(&Context, &Path) -> crate::Result<Outcome> + Send + 'static,
    {
        let ctx = self.context(config, Echo::Silent);
        let operation = format!("job_{}", name.split('-').next().unwrap_or(name));
        self.jobs.spawn(name, move |log| {
            let ctx = ctx.with_echo(Echo::Log(log.to_path_buf()));
            ops::measured(&operation, || work(&ctx, log))
        })
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            tracing::error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

/// All routes over `state`.
pub fn router(state: Arc<AppContext>) -> Router {
    routes::router()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Configured host, unless it is the catch-all default that lets the
/// server pick between IPv6 and IPv4.
fn configured_host(config: &Config) -> Option<IpAddr> {
    match config.web.host.parse::<IpAddr>() {
        Ok(addr) if !addr.is_unspecified() => Some(addr),
        _ => None,
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Serve the panel until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the state cannot be initialised or the port cannot
/// be bound
pub async fn serve(
    config: Config,
    exec: Arc<dyn Executor>,
    listen: Option<IpAddr>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.web.port);
    let listen = listen.or_else(|| configured_host(&config));
    let state_dir: PathBuf = config.web.state_dir.clone();
    let state = Arc::new(
        AppContext::new(config, exec)
            .with_context(|| format!("Failed to open state in {}", state_dir.display()))?,
    );
    let app = router(state);

    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            let socket_addr = format!("{}", std::net::SocketAddr::new(addr, port));
            let listener = TcpListener::bind(&socket_addr).await?;
            (listener, socket_addr)
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                let socket_addr = format!("0.0.0.0:{port}");
                (TcpListener::bind(&socket_addr).await?, socket_addr)
            }
        }
    };

    tracing::info!(address = %bind_addr, "web panel listening");
    println!("Listening on http://{bind_addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
