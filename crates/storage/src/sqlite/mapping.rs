use progress_core::model::{ItemType, RoleId, SkillName, SubSkillName, UserId, YearId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{
    IndividualSkillRow, RoadmapItemRow, RoadmapProgressRow, StorageError, SubSkillRow,
};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn text(row: &SqliteRow, column: &'static str) -> Result<String, StorageError> {
    row.try_get::<String, _>(column).map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<RoadmapProgressRow, StorageError> {
    Ok(RoadmapProgressRow {
        id: row.try_get("id").map_err(ser)?,
        user_id: UserId::new(text(row, "user_id")?).map_err(ser)?,
        role_id: RoleId::new(text(row, "role_id")?).map_err(ser)?,
        year_id: YearId::new(text(row, "year_id")?).map_err(ser)?,
        completion_percentage: row.try_get("completion_percentage").map_err(ser)?,
        last_updated: row.try_get("last_updated").map_err(ser)?,
    })
}

pub(crate) fn map_item_row(row: &SqliteRow) -> Result<RoadmapItemRow, StorageError> {
    let item_type: ItemType = text(row, "item_type")?.parse().map_err(ser)?;
    Ok(RoadmapItemRow {
        id: row.try_get("id").map_err(ser)?,
        roadmap_progress_id: row.try_get("roadmap_progress_id").map_err(ser)?,
        item_type,
        item_index: i64_to_u32("item_index", row.try_get("item_index").map_err(ser)?)?,
        completed: row.try_get("completed").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        notes: row.try_get("notes").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_skill_row(row: &SqliteRow) -> Result<IndividualSkillRow, StorageError> {
    Ok(IndividualSkillRow {
        id: row.try_get("id").map_err(ser)?,
        user_id: UserId::new(text(row, "user_id")?).map_err(ser)?,
        role_id: RoleId::new(text(row, "role_id")?).map_err(ser)?,
        year_id: YearId::new(text(row, "year_id")?).map_err(ser)?,
        skill_name: SkillName::new(text(row, "skill_name")?).map_err(ser)?,
        overall_progress: row.try_get("overall_progress").map_err(ser)?,
        last_updated: row.try_get("last_updated").map_err(ser)?,
    })
}

pub(crate) fn map_sub_skill_row(row: &SqliteRow) -> Result<SubSkillRow, StorageError> {
    Ok(SubSkillRow {
        id: row.try_get("id").map_err(ser)?,
        individual_skill_id: row.try_get("individual_skill_id").map_err(ser)?,
        sub_skill_name: SubSkillName::new(text(row, "sub_skill_name")?).map_err(ser)?,
        completed: row.try_get("completed").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        notes: row.try_get("notes").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}
