#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use oradba::{
    Result,
    config::Config,
    runner::{Captured, Executor, Invocation, LineSink},
};
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{Duration, Instant, sleep},
};

/// Replays canned results keyed by a substring of the command line or stdin.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Vec<(String, Captured)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, exit_code: i32, output: &str) -> Self {
        self.responses.push((
            needle.to_string(),
            Captured {
                exit_code,
                output: output.to_string(),
            },
        ));
        self
    }

    /// Every command line run so far, program first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(&self, invocation: &Invocation) -> Captured {
        let line = invocation.argv().join(" ");
        let haystack = format!("{line}\n{}", invocation.stdin.as_deref().unwrap_or_default());
        self.calls.lock().unwrap().push(line);
        self.responses
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, captured)| captured.clone())
            .unwrap_or_default()
    }
}

impl Executor for ScriptedExecutor {
    fn capture(&self, invocation: &Invocation) -> Result<Captured> {
        Ok(self.reply(invocation))
    }

    fn stream(&self, invocation: &Invocation, sink: &mut dyn LineSink) -> Result<Captured> {
        let captured = self.reply(invocation);
        for line in captured.output.lines() {
            sink.line(line)?;
        }
        Ok(captured)
    }

    fn interactive(&self, invocation: &Invocation) -> Result<i32> {
        Ok(self.reply(invocation).exit_code)
    }
}

/// Scratch tree with `logs/`, `scripts/` and `state/`.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn create() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["logs", "scripts", "state"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self, sub: &str) -> PathBuf {
        self.dir.path().join(sub)
    }

    pub fn config(&self) -> Config {
        Config::default()
            .with_log_dir(self.path("logs"))
            .with_scripts_dir(self.path("scripts"))
            .with_state_dir(self.path("state"))
    }

    /// Drop an executable stub for a lab script.
    pub fn script(&self, name: &str) -> PathBuf {
        let path = self.path("scripts").join(name);
        std::fs::write(&path, "#!/bin/bash\nexit 0\n").unwrap();
        path
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

pub fn pick_free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .expect("failed to bind random local port")
        .local_addr()
        .expect("failed to read local addr")
        .port()
}

pub fn oradba_binary_path() -> PathBuf {
    option_env!("CARGO_BIN_EXE_oradba")
        .map_or_else(|| PathBuf::from("target/debug/oradba"), PathBuf::from)
}

/// Status code and body of one HTTP/1.1 exchange.
pub async fn http(
    port: u16,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Option<(u16, String)> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.ok()?;
    let body = body.unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.ok()?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.ok()?;
    let response = String::from_utf8(response).ok()?;
    let (head, body) = response.split_once("\r\n\r\n")?;
    let status = head.split_whitespace().nth(1)?.parse().ok()?;
    Some((status, body.to_string()))
}

pub async fn fetch_metrics(port: u16) -> Option<String> {
    http(port, "GET", "/metrics", None)
        .await
        .map(|(_, body)| body)
}

pub async fn wait_for_server(port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if fetch_metrics(port).await.is_some() {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        sleep(Duration::from_millis(100)).await;
    }
}
