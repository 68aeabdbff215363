use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{
    RoadmapProgressRepository, SkillProgressRepository, Storage, StorageError,
};

mod mapping;
mod migrate;
mod roadmap_repo;
mod skill_repo;

/// Attempts per write before a contended transaction is reported as a conflict.
const MAX_WRITE_ATTEMPTS: u32 = 5;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// the connection pragmas fail during setup.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size. File databases are created if missing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or the connection fails.
    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str, max_connections: u32) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect_with(database_url, max_connections).await?;
        repo.migrate().await?;
        Ok(Self::from_sqlite(repo))
    }

    #[must_use]
    pub fn from_sqlite(repo: SqliteRepository) -> Self {
        let roadmap: Arc<dyn RoadmapProgressRepository> = Arc::new(repo.clone());
        let skills: Arc<dyn SkillProgressRepository> = Arc::new(repo);
        Self { roadmap, skills }
    }
}

/// Busy, locked and unique-constraint races between concurrent first writers.
fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation()
                || matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

pub(crate) fn db_err(err: sqlx::Error) -> StorageError {
    if is_contention(&err) {
        StorageError::Conflict(err.to_string())
    } else {
        StorageError::Connection(err.to_string())
    }
}

/// Re-run a whole transaction while it fails with `StorageError::Conflict`.
pub(crate) async fn with_retry<T, F, Fut>(op: &'static str, mut attempt: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(StorageError::Conflict(reason)) if tries < MAX_WRITE_ATTEMPTS => {
                tracing::debug!(op, tries, %reason, "retrying contended transaction");
                tokio::time::sleep(Duration::from_millis(10 * u64::from(tries))).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }

    #[tokio::test]
    async fn retry_gives_up_after_bounded_attempts() {
        let mut calls = 0;
        let result: Result<(), StorageError> = with_retry("test", || {
            calls += 1;
            async { Err(StorageError::Conflict("busy".into())) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
        assert_eq!(calls, MAX_WRITE_ATTEMPTS);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_other_failures() {
        let mut calls = 0;
        let result: Result<(), StorageError> = with_retry("test", || {
            calls += 1;
            async { Err(StorageError::Connection("gone".into())) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::Connection(_))));
        assert_eq!(calls, 1);
    }
}
