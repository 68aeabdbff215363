use std::collections::HashMap;

use chrono::{DateTime, Utc};
use progress_core::catalog::CatalogCounts;
use progress_core::model::{RoleId, UserId};
use progress_core::recalc::completion_from_totals;
use sqlx::SqliteConnection;

use super::mapping::{i64_to_u64, map_item_row, map_progress_row};
use super::{SqliteRepository, db_err, with_retry};
use crate::repository::{
    ItemWrite, ResetOutcome, RoadmapItemRow, RoadmapProgressRepository, RoadmapProgressRow,
    StorageError, YearKey, YearRecord,
};

const ITEM_COLUMNS: &str =
    "id, roadmap_progress_id, item_type, item_index, completed, completed_at, notes, updated_at";

/// Get-or-create the aggregate row. The insert is the first statement of the
/// transaction so the write lock is taken before anything is read.
async fn ensure_progress(
    conn: &mut SqliteConnection,
    key: &YearKey,
    at: DateTime<Utc>,
) -> Result<i64, StorageError> {
    sqlx::query(
        r"
        INSERT INTO roadmap_progress (user_id, role_id, year_id, completion_percentage, last_updated)
        VALUES (?1, ?2, ?3, 0, ?4)
        ON CONFLICT(user_id, role_id, year_id) DO NOTHING
        ",
    )
    .bind(key.user_id.as_str())
    .bind(key.role_id.as_str())
    .bind(key.year_id.as_str())
    .bind(at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM roadmap_progress WHERE user_id = ?1 AND role_id = ?2 AND year_id = ?3",
    )
    .bind(key.user_id.as_str())
    .bind(key.role_id.as_str())
    .bind(key.year_id.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)
}

/// Completion transitions and note retention are resolved by the statement
/// itself against the stored row.
async fn write_item(
    conn: &mut SqliteConnection,
    progress_id: i64,
    write: &ItemWrite,
) -> Result<RoadmapItemRow, StorageError> {
    let sql = format!(
        r"
        INSERT INTO roadmap_items (roadmap_progress_id, item_type, item_index, completed, completed_at, notes, updated_at)
        VALUES (?1, ?2, ?3, ?4, CASE WHEN ?4 THEN ?6 ELSE NULL END, ?5, ?6)
        ON CONFLICT(roadmap_progress_id, item_type, item_index) DO UPDATE SET
            completed = excluded.completed,
            completed_at = CASE
                WHEN excluded.completed = 1 THEN COALESCE(roadmap_items.completed_at, excluded.updated_at)
                ELSE NULL
            END,
            notes = COALESCE(excluded.notes, roadmap_items.notes),
            updated_at = excluded.updated_at
        RETURNING {ITEM_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(progress_id)
        .bind(write.item_type.as_str())
        .bind(i64::from(write.item_index))
        .bind(write.completed)
        .bind(write.notes.as_deref())
        .bind(write.at)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    map_item_row(&row)
}

async fn refresh_progress(
    conn: &mut SqliteConnection,
    progress_id: i64,
    counts: CatalogCounts,
    at: DateTime<Utc>,
) -> Result<RoadmapProgressRow, StorageError> {
    let completed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM roadmap_items WHERE roadmap_progress_id = ?1 AND completed = 1",
    )
    .bind(progress_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    let pct = completion_from_totals(i64_to_u64("completed", completed)?, counts.total());

    let row = sqlx::query(
        r"
        UPDATE roadmap_progress
        SET completion_percentage = ?1, last_updated = ?2
        WHERE id = ?3
        RETURNING id, user_id, role_id, year_id, completion_percentage, last_updated
        ",
    )
    .bind(pct)
    .bind(at)
    .bind(progress_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    map_progress_row(&row)
}

impl SqliteRepository {
    async fn upsert_item_once(
        &self,
        key: &YearKey,
        write: &ItemWrite,
        counts: CatalogCounts,
    ) -> Result<RoadmapItemRow, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let progress_id = ensure_progress(&mut tx, key, write.at).await?;
        let item = write_item(&mut tx, progress_id, write).await?;
        refresh_progress(&mut tx, progress_id, counts, write.at).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(item)
    }

    async fn upsert_year_once(
        &self,
        key: &YearKey,
        writes: &[ItemWrite],
        counts: CatalogCounts,
        at: DateTime<Utc>,
    ) -> Result<RoadmapProgressRow, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let progress_id = ensure_progress(&mut tx, key, at).await?;
        for write in writes {
            write_item(&mut tx, progress_id, write).await?;
        }
        let progress = refresh_progress(&mut tx, progress_id, counts, at).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(progress)
    }

    async fn reset_role_once(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let items = sqlx::query(
            r"
            DELETE FROM roadmap_items
            WHERE roadmap_progress_id IN (
                SELECT id FROM roadmap_progress WHERE user_id = ?1 AND role_id = ?2
            )
            ",
        )
        .bind(user_id.as_str())
        .bind(role_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let parents = sqlx::query("DELETE FROM roadmap_progress WHERE user_id = ?1 AND role_id = ?2")
            .bind(user_id.as_str())
            .bind(role_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(ResetOutcome {
            deleted_items: items.rows_affected(),
            deleted_parents: parents.rows_affected(),
        })
    }

    async fn items_for(&self, progress_id: i64) -> Result<Vec<RoadmapItemRow>, StorageError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM roadmap_items WHERE roadmap_progress_id = ?1 ORDER BY item_type, item_index"
        );
        let rows = sqlx::query(&sql)
            .bind(progress_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(map_item_row).collect()
    }
}

#[async_trait::async_trait]
impl RoadmapProgressRepository for SqliteRepository {
    async fn upsert_item(
        &self,
        key: &YearKey,
        write: &ItemWrite,
        counts: CatalogCounts,
    ) -> Result<RoadmapItemRow, StorageError> {
        with_retry("upsert_item", move || self.upsert_item_once(key, write, counts)).await
    }

    async fn upsert_year(
        &self,
        key: &YearKey,
        writes: &[ItemWrite],
        counts: CatalogCounts,
        at: DateTime<Utc>,
    ) -> Result<RoadmapProgressRow, StorageError> {
        with_retry("upsert_year", move || self.upsert_year_once(key, writes, counts, at)).await
    }

    async fn get_year(&self, key: &YearKey) -> Result<Option<YearRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, role_id, year_id, completion_percentage, last_updated
            FROM roadmap_progress
            WHERE user_id = ?1 AND role_id = ?2 AND year_id = ?3
            ",
        )
        .bind(key.user_id.as_str())
        .bind(key.role_id.as_str())
        .bind(key.year_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let progress = map_progress_row(&row)?;
        let items = self.items_for(progress.id).await?;
        Ok(Some(YearRecord { progress, items }))
    }

    async fn list_years(&self, user_id: &UserId) -> Result<Vec<YearRecord>, StorageError> {
        let parents = sqlx::query(
            r"
            SELECT id, user_id, role_id, year_id, completion_percentage, last_updated
            FROM roadmap_progress
            WHERE user_id = ?1
            ORDER BY role_id, year_id
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let sql = format!(
            r"
            SELECT {ITEM_COLUMNS} FROM roadmap_items
            WHERE roadmap_progress_id IN (SELECT id FROM roadmap_progress WHERE user_id = ?1)
            ORDER BY roadmap_progress_id, item_type, item_index
            "
        );
        let children = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut items_by_parent: HashMap<i64, Vec<RoadmapItemRow>> = HashMap::new();
        for row in &children {
            let item = map_item_row(row)?;
            items_by_parent
                .entry(item.roadmap_progress_id)
                .or_default()
                .push(item);
        }

        parents
            .iter()
            .map(|row| {
                let progress = map_progress_row(row)?;
                let items = items_by_parent.remove(&progress.id).unwrap_or_default();
                Ok(YearRecord { progress, items })
            })
            .collect()
    }

    async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError> {
        let outcome = with_retry("reset_roadmap_role", move || self.reset_role_once(user_id, role_id)).await?;
        tracing::info!(
            user_id = %user_id,
            role_id = %role_id,
            deleted_items = outcome.deleted_items,
            deleted_parents = outcome.deleted_parents,
            "roadmap progress reset"
        );
        Ok(outcome)
    }
}
