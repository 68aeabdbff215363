use std::collections::HashMap;

use chrono::{DateTime, Utc};
use progress_core::model::{RoleId, SubSkillName, UserId, YearId};
use progress_core::recalc::completion_from_totals;
use sqlx::SqliteConnection;

use super::mapping::{i64_to_u64, map_skill_row, map_sub_skill_row};
use super::{SqliteRepository, db_err, with_retry};
use crate::repository::{
    IndividualSkillRow, ResetOutcome, SkillKey, SkillProgressRepository, SkillRecord,
    StorageError, SubSkillRow, SubSkillWrite,
};

const SKILL_COLUMNS: &str =
    "id, user_id, role_id, year_id, skill_name, overall_progress, last_updated";

const SUB_SKILL_COLUMNS: &str =
    "id, individual_skill_id, sub_skill_name, completed, completed_at, notes, updated_at";

async fn ensure_skill(
    conn: &mut SqliteConnection,
    key: &SkillKey,
    at: DateTime<Utc>,
) -> Result<i64, StorageError> {
    sqlx::query(
        r"
        INSERT INTO individual_skills (user_id, role_id, year_id, skill_name, overall_progress, last_updated)
        VALUES (?1, ?2, ?3, ?4, 0, ?5)
        ON CONFLICT(user_id, role_id, year_id, skill_name) DO NOTHING
        ",
    )
    .bind(key.user_id.as_str())
    .bind(key.role_id.as_str())
    .bind(key.year_id.as_str())
    .bind(key.skill_name.as_str())
    .bind(at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    sqlx::query_scalar::<_, i64>(
        r"
        SELECT id FROM individual_skills
        WHERE user_id = ?1 AND role_id = ?2 AND year_id = ?3 AND skill_name = ?4
        ",
    )
    .bind(key.user_id.as_str())
    .bind(key.role_id.as_str())
    .bind(key.year_id.as_str())
    .bind(key.skill_name.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)
}

async fn write_sub_skill(
    conn: &mut SqliteConnection,
    skill_id: i64,
    name: &SubSkillName,
    write: &SubSkillWrite,
) -> Result<SubSkillRow, StorageError> {
    let sql = format!(
        r"
        INSERT INTO sub_skills (individual_skill_id, sub_skill_name, completed, completed_at, notes, updated_at)
        VALUES (?1, ?2, ?3, CASE WHEN ?3 THEN ?5 ELSE NULL END, ?4, ?5)
        ON CONFLICT(individual_skill_id, sub_skill_name) DO UPDATE SET
            completed = excluded.completed,
            completed_at = CASE
                WHEN excluded.completed = 1 THEN COALESCE(sub_skills.completed_at, excluded.updated_at)
                ELSE NULL
            END,
            notes = COALESCE(excluded.notes, sub_skills.notes),
            updated_at = excluded.updated_at
        RETURNING {SUB_SKILL_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(skill_id)
        .bind(name.as_str())
        .bind(write.completed)
        .bind(write.notes.as_deref())
        .bind(write.at)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    map_sub_skill_row(&row)
}

/// Overall progress is completed over touched sub-skills.
async fn refresh_skill(
    conn: &mut SqliteConnection,
    skill_id: i64,
    at: DateTime<Utc>,
) -> Result<IndividualSkillRow, StorageError> {
    let (touched, completed): (i64, i64) = sqlx::query_as(
        r"
        SELECT COUNT(*), COALESCE(SUM(completed), 0)
        FROM sub_skills
        WHERE individual_skill_id = ?1
        ",
    )
    .bind(skill_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    let overall = completion_from_totals(
        i64_to_u64("completed", completed)?,
        i64_to_u64("touched", touched)?,
    );

    let sql = format!(
        r"
        UPDATE individual_skills
        SET overall_progress = ?1, last_updated = ?2
        WHERE id = ?3
        RETURNING {SKILL_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(overall)
        .bind(at)
        .bind(skill_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    map_skill_row(&row)
}

impl SqliteRepository {
    async fn upsert_sub_skill_once(
        &self,
        key: &SkillKey,
        name: &SubSkillName,
        write: &SubSkillWrite,
    ) -> Result<SubSkillRow, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let skill_id = ensure_skill(&mut tx, key, write.at).await?;
        let sub = write_sub_skill(&mut tx, skill_id, name, write).await?;
        refresh_skill(&mut tx, skill_id, write.at).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(sub)
    }

    async fn upsert_skill_once(
        &self,
        key: &SkillKey,
        writes: &[(SubSkillName, SubSkillWrite)],
        at: DateTime<Utc>,
    ) -> Result<IndividualSkillRow, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let skill_id = ensure_skill(&mut tx, key, at).await?;
        for (name, write) in writes {
            write_sub_skill(&mut tx, skill_id, name, write).await?;
        }
        let skill = refresh_skill(&mut tx, skill_id, at).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(skill)
    }

    async fn reset_skills_once(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let children = sqlx::query(
            r"
            DELETE FROM sub_skills
            WHERE individual_skill_id IN (
                SELECT id FROM individual_skills WHERE user_id = ?1 AND role_id = ?2
            )
            ",
        )
        .bind(user_id.as_str())
        .bind(role_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let parents =
            sqlx::query("DELETE FROM individual_skills WHERE user_id = ?1 AND role_id = ?2")
                .bind(user_id.as_str())
                .bind(role_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(ResetOutcome {
            deleted_items: children.rows_affected(),
            deleted_parents: parents.rows_affected(),
        })
    }
}

#[async_trait::async_trait]
impl SkillProgressRepository for SqliteRepository {
    async fn upsert_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
        write: &SubSkillWrite,
    ) -> Result<SubSkillRow, StorageError> {
        with_retry("upsert_sub_skill", move || {
            self.upsert_sub_skill_once(key, sub_skill, write)
        })
        .await
    }

    async fn upsert_skill(
        &self,
        key: &SkillKey,
        writes: &[(SubSkillName, SubSkillWrite)],
        at: DateTime<Utc>,
    ) -> Result<IndividualSkillRow, StorageError> {
        with_retry("upsert_skill", move || self.upsert_skill_once(key, writes, at)).await
    }

    async fn get_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
    ) -> Result<Option<SubSkillRow>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT s.id, s.individual_skill_id, s.sub_skill_name, s.completed,
                   s.completed_at, s.notes, s.updated_at
            FROM sub_skills s
            JOIN individual_skills p ON p.id = s.individual_skill_id
            WHERE p.user_id = ?1 AND p.role_id = ?2 AND p.year_id = ?3
              AND p.skill_name = ?4 AND s.sub_skill_name = ?5
            ",
        )
            .bind(key.user_id.as_str())
            .bind(key.role_id.as_str())
            .bind(key.year_id.as_str())
            .bind(key.skill_name.as_str())
            .bind(sub_skill.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map_sub_skill_row).transpose()
    }

    async fn list_skills(
        &self,
        user_id: &UserId,
        scope: Option<(&RoleId, &YearId)>,
    ) -> Result<Vec<SkillRecord>, StorageError> {
        let role = scope.map(|(role, _)| role.as_str());
        let year = scope.map(|(_, year)| year.as_str());

        let sql = format!(
            r"
            SELECT {SKILL_COLUMNS} FROM individual_skills
            WHERE user_id = ?1 AND (?2 IS NULL OR (role_id = ?2 AND year_id = ?3))
            ORDER BY role_id, year_id, skill_name
            "
        );
        let parents = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(role)
            .bind(year)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let sql = format!(
            r"
            SELECT {SUB_SKILL_COLUMNS} FROM sub_skills
            WHERE individual_skill_id IN (
                SELECT id FROM individual_skills
                WHERE user_id = ?1 AND (?2 IS NULL OR (role_id = ?2 AND year_id = ?3))
            )
            ORDER BY individual_skill_id, sub_skill_name
            "
        );
        let children = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(role)
            .bind(year)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut subs_by_parent: HashMap<i64, Vec<SubSkillRow>> = HashMap::new();
        for row in &children {
            let sub = map_sub_skill_row(row)?;
            subs_by_parent
                .entry(sub.individual_skill_id)
                .or_default()
                .push(sub);
        }

        parents
            .iter()
            .map(|row| {
                let skill = map_skill_row(row)?;
                let sub_skills = subs_by_parent.remove(&skill.id).unwrap_or_default();
                Ok(SkillRecord { skill, sub_skills })
            })
            .collect()
    }

    async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError> {
        let outcome =
            with_retry("reset_skill_role", move || self.reset_skills_once(user_id, role_id)).await?;
        tracing::info!(
            user_id = %user_id,
            role_id = %role_id,
            deleted_sub_skills = outcome.deleted_items,
            deleted_skills = outcome.deleted_parents,
            "skill progress reset"
        );
        Ok(outcome)
    }
}
