#![allow(dead_code)]

pub mod pg;

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

pub use lms_test_support::{
    JsonReply, KillOnDrop, get_json, pick_unused_port, post_form, post_json, wait_http_ok,
};

/// Running gateway process plus the temp dir holding its config.
pub struct Gateway {
    pub base: String,
    pub child: KillOnDrop,
    _dir: tempfile::TempDir,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn demo_seed_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/demo_seed.sql")
}

/// Write a config that migrates and seeds the database at `database_url`.
pub fn write_demo_config(dir: &Path, database_url: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("gateway.yaml");
    let yaml = format!(
        r#"database:
  url: "{database_url}"
  migrate: true
  seedSql: "{}"
requestTimeoutSecs: 10
"#,
        demo_seed_path().display()
    );
    std::fs::write(&path, yaml).context("write gateway config")?;
    Ok(path)
}

pub fn spawn_gateway(config_path: &Path, port: u16) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_lms-gateway");
    Command::new(bin)
        .arg("--config")
        .arg(config_path)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--log-level")
        .arg("info")
        .spawn()
        .context("spawn lms-gateway")
}

/// Start the gateway on in-memory SQLite.
pub async fn start_demo_gateway() -> anyhow::Result<Gateway> {
    start_gateway_on("sqlite::memory:").await
}

/// Start the gateway against `database_url` on a free port and wait until `/health` answers.
pub async fn start_gateway_on(database_url: &str) -> anyhow::Result<Gateway> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let config = write_demo_config(dir.path(), database_url)?;
    let port = pick_unused_port()?;
    let child = KillOnDrop(spawn_gateway(&config, port)?);
    let base = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base}/health"), Duration::from_secs(20)).await?;
    Ok(Gateway {
        base,
        child,
        _dir: dir,
    })
}
