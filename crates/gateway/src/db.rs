//! Data store capability.
//!
//! Handlers talk to the host database only through [`Database`]: a parameterized SQL text with
//! `?` positional placeholders and `{table}` names, returning rows as plain field maps.
//! [`SqlDatabase`] implements it over a `sqlx` `AnyPool` (PostgreSQL or SQLite URLs).

use crate::error::{Result, StoreError};
use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column as _, Row as _};
use std::sync::LazyLock;
use tracing::{debug, info};

/// One row as `column name → value`.
pub type Record = Map<String, Value>;

const MIGRATION_LMS_TABLES: &str = include_str!("../migrations/0001_lms_tables.sql");

static TABLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z][A-Za-z0-9_]*)\}").expect("valid table regex"));

/// A positional SQL argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
    Null,
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Option<i64>> for SqlParam {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query and return every row, in the order the store produced them.
    async fn get_records_sql(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Record>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Run a query expected to match at most one row.
    async fn get_record_sql(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Record>> {
        let mut rows = self.get_records_sql(sql, params).await?;
        if rows.len() > 1 {
            return Err(StoreError::Query(format!(
                "expected at most one row, got {}",
                rows.len()
            )));
        }
        Ok(rows.pop())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn from_url(url: &str) -> anyhow::Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => anyhow::bail!("unsupported database scheme '{other}' (expected postgres or sqlite)"),
        }
    }
}

/// `sqlx`-backed [`Database`].
#[derive(Clone)]
pub struct SqlDatabase {
    pool: AnyPool,
    dialect: Dialect,
    table_prefix: String,
}

impl SqlDatabase {
    /// Connect to a PostgreSQL or SQLite database.
    ///
    /// In-memory SQLite (`sqlite::memory:`) is pinned to a single, never-recycled connection so
    /// the database survives for the lifetime of the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL scheme is unsupported or the pool cannot connect.
    pub async fn connect(url: &str, table_prefix: &str, max_connections: u32) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(url)?;

        let options = if dialect == Dialect::Sqlite && url.contains(":memory:") {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = options
            .connect(url)
            .await
            .with_context(|| format!("connect to {dialect:?} database"))?;

        info!(dialect = ?dialect, table_prefix, "database pool ready");
        Ok(Self {
            pool,
            dialect,
            table_prefix: table_prefix.to_string(),
        })
    }

    /// Expand `{table}` references and rewrite placeholders for the connected dialect.
    #[must_use]
    pub fn prepare_sql(&self, sql: &str) -> String {
        let expanded = expand_tables(sql, &self.table_prefix);
        match self.dialect {
            Dialect::Postgres => numbered_placeholders(&expanded),
            Dialect::Sqlite => expanded,
        }
    }

    /// Apply the bundled schema migration (the `-- migrate:up` section).
    ///
    /// # Errors
    ///
    /// Returns an error if any migration statement fails.
    pub async fn apply_migrations(&self) -> anyhow::Result<()> {
        let up = migration_up_section(MIGRATION_LMS_TABLES)?;
        self.execute_script(&up)
            .await
            .context("apply bundled migration 0001_lms_tables")?;
        info!("bundled migrations applied");
        Ok(())
    }

    /// Execute a `;`-separated script without parameters (migrations, seed data).
    ///
    /// # Errors
    ///
    /// Returns an error naming the first statement that fails.
    pub async fn execute_script(&self, script: &str) -> anyhow::Result<()> {
        for stmt in split_statements(script) {
            let sql = self.prepare_sql(&stmt);
            sqlx::query::<Any>(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("execute statement: {}", first_line(&stmt)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Database for SqlDatabase {
    async fn get_records_sql(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Record>> {
        let sql = self.prepare_sql(sql);
        debug!(sql = %sql, params = params.len(), "get_records_sql");
        let rows = bind_params(sqlx::query::<Any>(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let sql = self.prepare_sql(sql);
        debug!(sql = %sql, params = params.len(), "execute");
        let done = bind_params(sqlx::query::<Any>(&sql), params)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Any, AnyArguments<'q>> {
    for p in params {
        query = match p {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Null => query.bind(Option::<i64>::None),
        };
    }
    query
}

fn row_to_record(row: &AnyRow) -> Result<Record> {
    let mut out = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else {
            return Err(StoreError::Decode(format!(
                "column '{}' has an unsupported type",
                col.name()
            )));
        };
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

fn expand_tables(sql: &str, prefix: &str) -> String {
    TABLE_REF
        .replace_all(sql, |caps: &regex::Captures<'_>| format!("{prefix}{}", &caps[1]))
        .into_owned()
}

/// Rewrite `?` placeholders to `$1, $2, ...`, leaving quoted literals untouched.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut in_quote = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '?' if !in_quote => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

fn migration_up_section(sql: &str) -> anyhow::Result<String> {
    let (_, rest) = sql
        .split_once("-- migrate:up")
        .context("missing dbmate marker: -- migrate:up")?;
    let (up, _) = rest
        .split_once("-- migrate:down")
        .context("missing dbmate marker: -- migrate:down")?;
    Ok(up.trim().to_string())
}

fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|stmt| {
            stmt.lines()
                .filter(|l| !l.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn first_line(stmt: &str) -> &str {
    stmt.lines().next().unwrap_or_default()
}
