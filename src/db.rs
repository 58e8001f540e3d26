use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{CreatorPilotError, Result};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
pub type SqlitePool = Pool<SqliteAsyncConn>;
pub type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

const CONNECTION_PRAGMAS: &str =
    "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;";

pub fn db_err(err: impl std::fmt::Display) -> CreatorPilotError {
    CreatorPilotError::Runtime(err.to_string())
}

pub fn ensure_parent_dir(path: &str) -> Result<()> {
    if path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(db_err)?;
        }
    }
    Ok(())
}

pub fn open_connection_sync(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url).map_err(db_err)?;
    conn.batch_execute(CONNECTION_PRAGMAS).map_err(db_err)?;
    Ok(conn)
}

pub async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = open_connection_sync(&database_url)?;
        let applied = conn.run_pending_migrations(MIGRATIONS).map_err(db_err)?;
        if !applied.is_empty() {
            tracing::info!(
                count = applied.len(),
                database = %database_url,
                "Applied pending migrations"
            );
        }
        Ok::<_, CreatorPilotError>(())
    })
    .await
    .map_err(db_err)??;
    Ok(())
}

/// Prepares the file, migrates it, and builds the async pool every store uses.
pub async fn connect_pool(sqlite_path: &str) -> Result<SqlitePool> {
    ensure_parent_dir(sqlite_path)?;
    run_migrations(sqlite_path).await?;
    let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
    Pool::builder().build(manager).await.map_err(db_err)
}

/// Runs `work` on a blocking thread inside `BEGIN IMMEDIATE`. Writers on
/// other connections wait on the busy timeout until it commits.
pub async fn write_transaction<R, F>(sqlite_path: &str, work: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<R> + Send + 'static,
{
    let database_url = sqlite_path.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = open_connection_sync(&database_url)?;
        conn.immediate_transaction(work)
    })
    .await
    .map_err(db_err)?
}

pub async fn checkout(pool: &SqlitePool) -> Result<SqlitePooledConn<'_>> {
    let mut conn = pool.get().await.map_err(db_err)?;
    diesel_async::RunQueryDsl::execute(diesel::sql_query("PRAGMA busy_timeout = 5000"), &mut conn)
        .await
        .map_err(db_err)?;
    Ok(conn)
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Accepts `YYYY-MM-DD` (optionally followed by a time part) and returns the date part.
pub fn normalize_date(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| {
            CreatorPilotError::Validation(format!("invalid date '{trimmed}', expected YYYY-MM-DD"))
        })
}
