use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs versioned migrations inside a transaction each.
///
/// Version 1 creates the roadmap and skill progress tables. Uniqueness of
/// every parent and child key is enforced here, not by callers.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS roadmap_progress (
                    id INTEGER PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    role_id TEXT NOT NULL,
                    year_id TEXT NOT NULL,
                    completion_percentage REAL NOT NULL DEFAULT 0
                        CHECK (completion_percentage BETWEEN 0 AND 100),
                    last_updated TEXT NOT NULL,
                    UNIQUE (user_id, role_id, year_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS roadmap_items (
                    id INTEGER PRIMARY KEY,
                    roadmap_progress_id INTEGER NOT NULL,
                    item_type TEXT NOT NULL
                        CHECK (item_type IN ('skills', 'projects', 'freeResources', 'paidResources')),
                    item_index INTEGER NOT NULL CHECK (item_index >= 0),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    completed_at TEXT,
                    notes TEXT,
                    updated_at TEXT NOT NULL,
                    UNIQUE (roadmap_progress_id, item_type, item_index),
                    FOREIGN KEY (roadmap_progress_id) REFERENCES roadmap_progress(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS individual_skills (
                    id INTEGER PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    role_id TEXT NOT NULL,
                    year_id TEXT NOT NULL,
                    skill_name TEXT NOT NULL,
                    overall_progress REAL NOT NULL DEFAULT 0
                        CHECK (overall_progress BETWEEN 0 AND 100),
                    last_updated TEXT NOT NULL,
                    UNIQUE (user_id, role_id, year_id, skill_name)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sub_skills (
                    id INTEGER PRIMARY KEY,
                    individual_skill_id INTEGER NOT NULL,
                    sub_skill_name TEXT NOT NULL,
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    completed_at TEXT,
                    notes TEXT,
                    updated_at TEXT NOT NULL,
                    UNIQUE (individual_skill_id, sub_skill_name),
                    FOREIGN KEY (individual_skill_id) REFERENCES individual_skills(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_roadmap_progress_user_role
                ON roadmap_progress (user_id, role_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_individual_skills_user_role_year
                ON individual_skills (user_id, role_id, year_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
