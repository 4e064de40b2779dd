//! SQLite pool backing the flight declaration store.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

/// Open pool with the flight declaration schema applied.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Open the database at `db_path`, creating the file when missing, and apply the schema.
///
/// `:memory:` is private to each connection, so it is opened with a single
/// connection that is never recycled.
pub async fn init_database(db_path: &str, max_connections: u32) -> Result<Database> {
    let in_memory = db_path == ":memory:";
    let options = if in_memory {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        if let Some(dir) = Path::new(db_path)
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating database directory {}", dir.display()))?;
        }
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
    };

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
    if in_memory {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("opening database {}", db_path))?;

    // Every statement is IF NOT EXISTS, so reopening an existing file is a no-op.
    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .context("applying flight declaration schema")?;
    info!("Flight declaration database ready at {}", db_path);

    Ok(Database { pool })
}
