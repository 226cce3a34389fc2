//! LMS external-function gateway.
//!
//! Wires the typed function registry from `lms-external-functions` to a SQL store and serves
//! it over HTTP (JSON and a form-encoded REST endpoint).

pub mod config;
pub mod db;
pub mod error;
pub mod functions;
pub mod gradebook;
pub mod http;

use anyhow::Context as _;
use config::Settings;
use db::{Database, SqlDatabase};
use gradebook::SqlGradebook;
use std::sync::Arc;
use tracing::info;

/// Connect the store, optionally migrate and seed it, and register the built-in functions.
///
/// # Errors
///
/// Returns an error if the database is unreachable, a migration or seed statement fails, or
/// the built-in registry cannot be assembled.
pub async fn build_state(settings: &Settings) -> anyhow::Result<http::GatewayState> {
    let db = SqlDatabase::connect(
        &settings.database_url,
        &settings.table_prefix,
        settings.max_connections,
    )
    .await?;

    if settings.migrate {
        db.apply_migrations().await?;
    }
    if let Some(seed) = &settings.seed_sql {
        let script = std::fs::read_to_string(seed)
            .with_context(|| format!("read seed script {}", seed.display()))?;
        db.execute_script(&script)
            .await
            .with_context(|| format!("run seed script {}", seed.display()))?;
        info!(path = %seed.display(), "seed script applied");
    }

    let db: Arc<dyn Database> = Arc::new(db);
    let gradebook = Arc::new(SqlGradebook::new(db.clone()));
    let registry = functions::builtin_registry(db, gradebook)?;

    Ok(http::GatewayState {
        registry,
        request_timeout: settings.request_timeout,
    })
}
