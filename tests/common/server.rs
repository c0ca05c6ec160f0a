//! Test server management.
//!
//! Spawns reportgate instances inside the test process. Every server gets a
//! fresh `AppState`, so rate buckets never leak between tests.

use reportgate::config::Config;
use reportgate::reports::MemoryReportStore;
use reportgate::state::AppState;
use reportgate::{http, metrics};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[allow(dead_code)]
pub const TEST_SECRET: &str = "integration-test-secret-7f3a9c2e";

/// A test server instance.
pub struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    /// Spawn a server with a signing secret and small quotas
    /// (create 5/60s, evidence 3/60s).
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(&format!(
            r#"
[rate_limits.create]
max_requests = 5
window_secs = 60

[rate_limits.evidence]
max_requests = 3
window_secs = 60

[upload_token]
secret = "{TEST_SECRET}"
ttl_secs = 600
"#
        ))
        .await
    }

    /// Spawn a server from a TOML config document.
    pub async fn spawn_with(config_toml: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(config_toml)?;
        if config.server.metrics {
            metrics::init();
        }

        let state = Arc::new(AppState::new(config, Arc::new(MemoryReportStore::new())));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = http::serve(listener, state).await {
                eprintln!("test server stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            client: reqwest::Client::new(),
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }

    /// POST /reports as `client` (sent via `x-forwarded-for`).
    pub async fn create_report(
        &self,
        client: &str,
        title: &str,
    ) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/reports"))
            .header("x-forwarded-for", client)
            .json(&json!({ "title": title }))
            .send()
            .await?)
    }

    /// Create a report and return its `(id, upload_token)`.
    pub async fn create_ok(&self, client: &str) -> anyhow::Result<(String, Option<String>)> {
        let resp = self.create_report(client, "Broken streetlight").await?;
        anyhow::ensure!(resp.status() == 201, "create failed: {}", resp.status());
        let body: Value = resp.json().await?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing id"))?
            .to_string();
        let token = body["upload_token"].as_str().map(str::to_string);
        Ok((id, token))
    }

    /// POST /reports/{id}/evidence with the token in the header.
    pub async fn attach_evidence(
        &self,
        client: &str,
        report_id: &str,
        token: Option<&str>,
    ) -> anyhow::Result<reqwest::Response> {
        let mut req = self
            .client
            .post(self.url(&format!("/reports/{report_id}/evidence")))
            .header("x-forwarded-for", client)
            .json(&json!({ "url": "https://example.org/photo.jpg" }));
        if let Some(token) = token {
            req = req.header("x-upload-token", token);
        }
        Ok(req.send().await?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
