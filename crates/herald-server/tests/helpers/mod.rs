#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::Value;

pub const API_TOKEN: &str = "e2e-token";

/// A running `herald-server` instance for e2e testing.
///
/// Spawns the server binary on a random port with a temporary data directory.
/// The server is killed when this struct is dropped.
pub struct TestServer {
    child: Option<Child>,
    addr: String,
    port: u16,
    /// Kept alive for the duration of the test. When dropped, the temp dir is cleaned up.
    /// `None` after `kill_and_take_data()` transfers ownership.
    data_dir: Option<tempfile::TempDir>,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a new herald-server instance on a random port.
    pub fn start() -> Self {
        let data_dir = tempfile::tempdir().expect("create temp dir");
        Self::spawn(data_dir, free_port())
    }

    /// Kill the server and return the data directory for restarting on the same data.
    /// This simulates a crash: the server is killed with SIGKILL.
    pub fn kill_and_take_data(mut self) -> (tempfile::TempDir, u16) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let data_dir = self.data_dir.take().expect("data_dir already taken");
        (data_dir, self.port)
    }

    /// Restart a server on the same data directory and port.
    pub fn restart_on(data_dir: tempfile::TempDir, port: u16) -> Self {
        Self::spawn(data_dir, port)
    }

    fn spawn(data_dir: tempfile::TempDir, port: u16) -> Self {
        let addr = format!("127.0.0.1:{port}");

        let config_content = format!(
            r#"[server]
listen_addr = "{addr}"
api_token = "{API_TOKEN}"

[scheduler]
poll_interval_ms = 50

[delivery]
timeout_ms = 2000
workers = 2
"#
        );
        std::fs::write(data_dir.path().join("herald.toml"), config_content)
            .expect("write config");

        let mut child = Command::new(env!("CARGO_BIN_EXE_herald-server"))
            .env(
                "HERALD_DATA_DIR",
                data_dir.path().join("data").to_str().unwrap(),
            )
            .env_remove("HERALD_API_TOKEN")
            .current_dir(data_dir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("start herald-server");

        // Drain output so the process doesn't block on a full pipe.
        for pipe in [
            child.stdout.take().map(|s| Box::new(s) as Box<dyn std::io::Read + Send>),
            child.stderr.take().map(|s| Box::new(s) as Box<dyn std::io::Read + Send>),
        ]
        .into_iter()
        .flatten()
        {
            std::thread::spawn(move || {
                for _line in BufReader::new(pipe).lines().map_while(Result::ok) {}
            });
        }

        // Poll TCP until the server is reachable.
        let start = std::time::Instant::now();
        let mut connected = false;
        while start.elapsed() < Duration::from_secs(10) {
            if std::net::TcpStream::connect(&addr).is_ok() {
                connected = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(
            connected,
            "herald-server did not become reachable at {addr} within 10s"
        );

        Self {
            child: Some(child),
            addr: format!("http://{addr}"),
            port,
            data_dir: Some(data_dir),
            client: reqwest::Client::new(),
        }
    }

    /// The HTTP address of the running server (e.g., "http://127.0.0.1:12345").
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send an authenticated request and return the status and JSON body.
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> (reqwest::StatusCode, Value) {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.addr))
            .bearer_auth(API_TOKEN);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("send request");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Schedule a message that posts `payload` to `webhook_url`.
    pub async fn create(
        &self,
        id: &str,
        schedule_to: &str,
        webhook_url: &str,
        payload: Value,
    ) -> Value {
        let (status, body) = self
            .request(
                reqwest::Method::POST,
                "/messages",
                Some(serde_json::json!({
                    "id": id,
                    "scheduleTo": schedule_to,
                    "payload": payload,
                    "webhookUrl": webhook_url,
                })),
            )
            .await;
        assert!(status.is_success(), "create {id} failed: {status} {body}");
        body
    }

    /// Ids currently waiting to fire, earliest first.
    pub async fn pending_ids(&self) -> Vec<String> {
        let (status, body) = self.request(reqwest::Method::GET, "/messages", None).await;
        assert!(status.is_success(), "list failed: {status} {body}");
        body["scheduledJobs"]
            .as_array()
            .expect("scheduledJobs array")
            .iter()
            .map(|job| job["messageId"].as_str().unwrap().to_string())
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// RFC 3339 timestamp `offset_ms` from now.
pub fn in_ms(offset_ms: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::milliseconds(offset_ms)).to_rfc3339()
}

/// Wait until the mock callback endpoint has received `count` requests.
pub async fn wait_for_callbacks(
    server: &wiremock::MockServer,
    count: usize,
    timeout: Duration,
) -> Vec<wiremock::Request> {
    let start = std::time::Instant::now();
    loop {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= count {
            return received;
        }
        assert!(
            start.elapsed() < timeout,
            "expected {count} callbacks within {timeout:?}, got {}",
            received.len()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Find a free TCP port.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to free port");
    listener.local_addr().unwrap().port()
}
