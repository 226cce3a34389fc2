//! Helpers shared by the gateway's process-level integration tests.

use anyhow::Context as _;
use serde_json::Value;
use std::net::TcpListener;
use std::process::Child;
use std::time::{Duration, Instant};

/// Child process that is killed when the handle goes out of scope.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: the port is not reserved; another process may still bind it first.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status.
///
/// # Errors
///
/// Returns an error if the timeout elapses first.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// HTTP status plus the decoded JSON body (`Null` when the body is not JSON).
#[derive(Debug)]
pub struct JsonReply {
    pub status: u16,
    pub body: Value,
}

async fn into_reply(resp: reqwest::Response) -> anyhow::Result<JsonReply> {
    let status = resp.status().as_u16();
    let bytes = resp.bytes().await.context("read response body")?;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok(JsonReply { status, body })
}

/// POST a JSON body and decode the JSON reply, whatever the status.
///
/// # Errors
///
/// Returns an error if the request cannot be sent or the body cannot be read.
pub async fn post_json(url: &str, body: &Value) -> anyhow::Result<JsonReply> {
    let resp = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    into_reply(resp).await
}

/// POST `application/x-www-form-urlencoded` fields and decode the JSON reply.
///
/// # Errors
///
/// Returns an error if the request cannot be sent or the body cannot be read.
pub async fn post_form(url: &str, fields: &[(&str, &str)]) -> anyhow::Result<JsonReply> {
    let resp = reqwest::Client::new()
        .post(url)
        .form(fields)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    into_reply(resp).await
}

/// GET a URL and decode the JSON reply.
///
/// # Errors
///
/// Returns an error if the request cannot be sent or the body cannot be read.
pub async fn get_json(url: &str) -> anyhow::Result<JsonReply> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url}"))?;
    into_reply(resp).await
}
