use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::api::{ItemView, SkillProgressView, SubSkillView, YearProgressView};
use progress_core::catalog::CatalogCounts;
use progress_core::model::{
    ItemTrack, ItemType, RoleId, SkillName, SubSkillName, SubSkillProgress, UserId, YearId,
    merge_notes, next_completed_at,
};
use progress_core::recalc::completion_from_totals;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Conflicts and connection failures may succeed if the caller tries again later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Conflict(_) | StorageError::Connection(_))
    }
}

//
// ─── KEYS & WRITES ─────────────────────────────────────────────────────────────
//

/// Identifies one aggregate progress row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct YearKey {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub year_id: YearId,
}

impl YearKey {
    #[must_use]
    pub fn new(user_id: UserId, role_id: RoleId, year_id: YearId) -> Self {
        Self {
            user_id,
            role_id,
            year_id,
        }
    }
}

/// Identifies one named-skill row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkillKey {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub year_id: YearId,
    pub skill_name: SkillName,
}

impl SkillKey {
    #[must_use]
    pub fn new(user_id: UserId, role_id: RoleId, year_id: YearId, skill_name: SkillName) -> Self {
        Self {
            user_id,
            role_id,
            year_id,
            skill_name,
        }
    }
}

/// Desired state of one roadmap item. `at` is when the change happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemWrite {
    pub item_type: ItemType,
    pub item_index: u32,
    pub completed: bool,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Desired state of one sub-skill. `at` is when the change happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSkillWrite {
    pub completed: bool,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Aggregate row per (user, role, year). The percentage is a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadmapProgressRow {
    pub id: i64,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub year_id: YearId,
    pub completion_percentage: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadmapItemRow {
    pub id: i64,
    pub roadmap_progress_id: i64,
    pub item_type: ItemType,
    pub item_index: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RoadmapItemRow {
    #[must_use]
    pub fn to_view(&self) -> ItemView {
        ItemView {
            item_type: self.item_type,
            item_index: self.item_index,
            completed: self.completed,
            completed_at: self.completed_at,
            notes: self.notes.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// A progress row with all of its item rows.
#[derive(Debug, Clone, PartialEq)]
pub struct YearRecord {
    pub progress: RoadmapProgressRow,
    pub items: Vec<RoadmapItemRow>,
}

impl YearRecord {
    /// Rebuild the four boolean sequences, each sized to its highest touched index.
    #[must_use]
    pub fn into_view(self) -> YearProgressView {
        let mut tracks: HashMap<ItemType, ItemTrack> = HashMap::new();
        for item in &self.items {
            tracks
                .entry(item.item_type)
                .or_default()
                .set(item.item_index, item.completed);
        }
        let mut take = |t: ItemType| tracks.remove(&t).unwrap_or_default().to_vec();

        YearProgressView {
            skills: take(ItemType::Skills),
            projects: take(ItemType::Projects),
            free_resources: take(ItemType::FreeResources),
            paid_resources: take(ItemType::PaidResources),
            role_id: self.progress.role_id,
            year_id: self.progress.year_id,
            completion_percentage: self.progress.completion_percentage,
            last_updated: Some(self.progress.last_updated),
        }
    }
}

/// Aggregate row per (user, role, year, skill). The progress value is a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualSkillRow {
    pub id: i64,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub year_id: YearId,
    pub skill_name: SkillName,
    pub overall_progress: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSkillRow {
    pub id: i64,
    pub individual_skill_id: i64,
    pub sub_skill_name: SubSkillName,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SubSkillRow {
    #[must_use]
    pub fn to_view(&self, key: &SkillKey) -> SubSkillView {
        SubSkillView {
            role_id: key.role_id.clone(),
            year_id: key.year_id.clone(),
            skill_name: key.skill_name.clone(),
            sub_skill_name: self.sub_skill_name.clone(),
            completed: self.completed,
            completed_at: self.completed_at,
            notes: self.notes.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// A skill row with all of its sub-skill rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRecord {
    pub skill: IndividualSkillRow,
    pub sub_skills: Vec<SubSkillRow>,
}

impl SkillRecord {
    #[must_use]
    pub fn into_view(self) -> SkillProgressView {
        let sub_skills: BTreeMap<SubSkillName, SubSkillProgress> = self
            .sub_skills
            .into_iter()
            .map(|row| {
                (
                    row.sub_skill_name,
                    SubSkillProgress {
                        completed: row.completed,
                        completed_at: row.completed_at,
                        notes: row.notes,
                    },
                )
            })
            .collect();

        SkillProgressView {
            role_id: self.skill.role_id,
            year_id: self.skill.year_id,
            skill_name: self.skill.skill_name,
            sub_skills,
            overall_progress: self.skill.overall_progress,
            last_updated: self.skill.last_updated,
        }
    }
}

/// Rows removed by a role reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    pub deleted_items: u64,
    pub deleted_parents: u64,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Aggregate roadmap progress and per-item rows.
#[async_trait]
pub trait RoadmapProgressRepository: Send + Sync {
    /// Get-or-create the progress row, upsert one item, refresh the cached
    /// percentage from `counts`, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is applied.
    async fn upsert_item(
        &self,
        key: &YearKey,
        write: &ItemWrite,
        counts: CatalogCounts,
    ) -> Result<RoadmapItemRow, StorageError>;

    /// Bulk variant of `upsert_item` for one (user, role, year).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is applied.
    async fn upsert_year(
        &self,
        key: &YearKey,
        writes: &[ItemWrite],
        counts: CatalogCounts,
        at: DateTime<Utc>,
    ) -> Result<RoadmapProgressRow, StorageError>;

    /// Fetch one progress row with its items.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_year(&self, key: &YearKey) -> Result<Option<YearRecord>, StorageError>;

    /// Fetch every progress row of the user with its items.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_years(&self, user_id: &UserId) -> Result<Vec<YearRecord>, StorageError>;

    /// Delete item rows, then progress rows, for (user, role).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is deleted.
    async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError>;
}

/// Named skills and their sub-skill rows.
#[async_trait]
pub trait SkillProgressRepository: Send + Sync {
    /// Get-or-create the skill row, upsert one sub-skill, refresh the cached
    /// overall progress, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is applied.
    async fn upsert_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
        write: &SubSkillWrite,
    ) -> Result<SubSkillRow, StorageError>;

    /// Bulk variant of `upsert_sub_skill` for one skill.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is applied.
    async fn upsert_skill(
        &self,
        key: &SkillKey,
        writes: &[(SubSkillName, SubSkillWrite)],
        at: DateTime<Utc>,
    ) -> Result<IndividualSkillRow, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
    ) -> Result<Option<SubSkillRow>, StorageError>;

    /// List skills of the user, optionally scoped to one (role, year).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_skills(
        &self,
        user_id: &UserId,
        scope: Option<(&RoleId, &YearId)>,
    ) -> Result<Vec<SkillRecord>, StorageError>;

    /// Delete sub-skill rows, then skill rows, for (user, role).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction fails; nothing is deleted.
    async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

type YearTuple = (UserId, RoleId, YearId);
type SkillTuple = (UserId, RoleId, YearId, SkillName);

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    progress: HashMap<YearTuple, RoadmapProgressRow>,
    items: HashMap<(i64, ItemType, u32), RoadmapItemRow>,
    skills: HashMap<SkillTuple, IndividualSkillRow>,
    sub_skills: HashMap<(i64, SubSkillName), SubSkillRow>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn progress_entry(&mut self, key: &YearKey, at: DateTime<Utc>) -> i64 {
        let tuple = (key.user_id.clone(), key.role_id.clone(), key.year_id.clone());
        if let Some(row) = self.progress.get(&tuple) {
            return row.id;
        }
        let id = self.next_id();
        self.progress.insert(
            tuple,
            RoadmapProgressRow {
                id,
                user_id: key.user_id.clone(),
                role_id: key.role_id.clone(),
                year_id: key.year_id.clone(),
                completion_percentage: 0.0,
                last_updated: at,
            },
        );
        id
    }

    fn apply_item(&mut self, progress_id: i64, write: &ItemWrite) -> RoadmapItemRow {
        let slot = (progress_id, write.item_type, write.item_index);
        let id = match self.items.get(&slot) {
            Some(existing) => existing.id,
            None => self.next_id(),
        };
        let previous = self.items.remove(&slot);
        let row = RoadmapItemRow {
            id,
            roadmap_progress_id: progress_id,
            item_type: write.item_type,
            item_index: write.item_index,
            completed: write.completed,
            completed_at: next_completed_at(
                previous.as_ref().and_then(|p| p.completed_at),
                write.completed,
                write.at,
            ),
            notes: merge_notes(previous.and_then(|p| p.notes), write.notes.clone()),
            updated_at: write.at,
        };
        self.items.insert(slot, row.clone());
        row
    }

    fn refresh_progress(&mut self, key: &YearKey, counts: CatalogCounts, at: DateTime<Utc>) {
        let tuple = (key.user_id.clone(), key.role_id.clone(), key.year_id.clone());
        let Some(row) = self.progress.get_mut(&tuple) else {
            return;
        };
        let completed = self
            .items
            .values()
            .filter(|item| item.roadmap_progress_id == row.id && item.completed)
            .count() as u64;
        row.completion_percentage = completion_from_totals(completed, counts.total());
        row.last_updated = at;
    }

    fn year_record(&self, row: &RoadmapProgressRow) -> YearRecord {
        let mut items: Vec<RoadmapItemRow> = self
            .items
            .values()
            .filter(|item| item.roadmap_progress_id == row.id)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.item_type, item.item_index));
        YearRecord {
            progress: row.clone(),
            items,
        }
    }

    fn skill_entry(&mut self, key: &SkillKey, at: DateTime<Utc>) -> i64 {
        let tuple = (
            key.user_id.clone(),
            key.role_id.clone(),
            key.year_id.clone(),
            key.skill_name.clone(),
        );
        if let Some(row) = self.skills.get(&tuple) {
            return row.id;
        }
        let id = self.next_id();
        self.skills.insert(
            tuple,
            IndividualSkillRow {
                id,
                user_id: key.user_id.clone(),
                role_id: key.role_id.clone(),
                year_id: key.year_id.clone(),
                skill_name: key.skill_name.clone(),
                overall_progress: 0.0,
                last_updated: at,
            },
        );
        id
    }

    fn apply_sub_skill(
        &mut self,
        skill_id: i64,
        name: &SubSkillName,
        write: &SubSkillWrite,
    ) -> SubSkillRow {
        let slot = (skill_id, name.clone());
        let previous = self.sub_skills.remove(&slot);
        let id = match previous.as_ref() {
            Some(existing) => existing.id,
            None => self.next_id(),
        };
        let row = SubSkillRow {
            id,
            individual_skill_id: skill_id,
            sub_skill_name: name.clone(),
            completed: write.completed,
            completed_at: next_completed_at(
                previous.as_ref().and_then(|p| p.completed_at),
                write.completed,
                write.at,
            ),
            notes: merge_notes(previous.and_then(|p| p.notes), write.notes.clone()),
            updated_at: write.at,
        };
        self.sub_skills.insert(slot, row.clone());
        row
    }

    fn refresh_skill(&mut self, key: &SkillKey, at: DateTime<Utc>) -> Option<IndividualSkillRow> {
        let tuple = (
            key.user_id.clone(),
            key.role_id.clone(),
            key.year_id.clone(),
            key.skill_name.clone(),
        );
        let row = self.skills.get_mut(&tuple)?;
        let (touched, completed) = self
            .sub_skills
            .values()
            .filter(|sub| sub.individual_skill_id == row.id)
            .fold((0u64, 0u64), |(t, c), sub| (t + 1, c + u64::from(sub.completed)));
        row.overall_progress = completion_from_totals(completed, touched);
        row.last_updated = at;
        Some(row.clone())
    }

    fn skill_record(&self, row: &IndividualSkillRow) -> SkillRecord {
        let mut sub_skills: Vec<SubSkillRow> = self
            .sub_skills
            .values()
            .filter(|sub| sub.individual_skill_id == row.id)
            .cloned()
            .collect();
        sub_skills.sort_by(|a, b| a.sub_skill_name.cmp(&b.sub_skill_name));
        SkillRecord {
            skill: row.clone(),
            sub_skills,
        }
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single lock guards all tables, so every operation is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Number of aggregate progress rows, for assertions in tests.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn progress_row_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.progress.len())
    }
}

#[async_trait]
impl RoadmapProgressRepository for InMemoryRepository {
    async fn upsert_item(
        &self,
        key: &YearKey,
        write: &ItemWrite,
        counts: CatalogCounts,
    ) -> Result<RoadmapItemRow, StorageError> {
        let mut guard = self.lock()?;
        let progress_id = guard.progress_entry(key, write.at);
        let row = guard.apply_item(progress_id, write);
        guard.refresh_progress(key, counts, write.at);
        Ok(row)
    }

    async fn upsert_year(
        &self,
        key: &YearKey,
        writes: &[ItemWrite],
        counts: CatalogCounts,
        at: DateTime<Utc>,
    ) -> Result<RoadmapProgressRow, StorageError> {
        let mut guard = self.lock()?;
        let progress_id = guard.progress_entry(key, at);
        for write in writes {
            guard.apply_item(progress_id, write);
        }
        guard.refresh_progress(key, counts, at);
        let tuple = (key.user_id.clone(), key.role_id.clone(), key.year_id.clone());
        guard
            .progress
            .get(&tuple)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn get_year(&self, key: &YearKey) -> Result<Option<YearRecord>, StorageError> {
        let guard = self.lock()?;
        let tuple = (key.user_id.clone(), key.role_id.clone(), key.year_id.clone());
        Ok(guard.progress.get(&tuple).map(|row| guard.year_record(row)))
    }

    async fn list_years(&self, user_id: &UserId) -> Result<Vec<YearRecord>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<YearRecord> = guard
            .progress
            .values()
            .filter(|row| &row.user_id == user_id)
            .map(|row| guard.year_record(row))
            .collect();
        out.sort_by(|a, b| {
            (&a.progress.role_id, &a.progress.year_id).cmp(&(&b.progress.role_id, &b.progress.year_id))
        });
        Ok(out)
    }

    async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError> {
        let mut guard = self.lock()?;
        let ids: Vec<i64> = guard
            .progress
            .values()
            .filter(|row| &row.user_id == user_id && &row.role_id == role_id)
            .map(|row| row.id)
            .collect();

        let before = guard.items.len();
        guard
            .items
            .retain(|_, item| !ids.contains(&item.roadmap_progress_id));
        let deleted_items = (before - guard.items.len()) as u64;

        guard
            .progress
            .retain(|(user, role, _), _| !(user == user_id && role == role_id));

        Ok(ResetOutcome {
            deleted_items,
            deleted_parents: ids.len() as u64,
        })
    }
}

#[async_trait]
impl SkillProgressRepository for InMemoryRepository {
    async fn upsert_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
        write: &SubSkillWrite,
    ) -> Result<SubSkillRow, StorageError> {
        let mut guard = self.lock()?;
        let skill_id = guard.skill_entry(key, write.at);
        let row = guard.apply_sub_skill(skill_id, sub_skill, write);
        guard.refresh_skill(key, write.at);
        Ok(row)
    }

    async fn upsert_skill(
        &self,
        key: &SkillKey,
        writes: &[(SubSkillName, SubSkillWrite)],
        at: DateTime<Utc>,
    ) -> Result<IndividualSkillRow, StorageError> {
        let mut guard = self.lock()?;
        let skill_id = guard.skill_entry(key, at);
        for (name, write) in writes {
            guard.apply_sub_skill(skill_id, name, write);
        }
        guard.refresh_skill(key, at).ok_or(StorageError::NotFound)
    }

    async fn get_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
    ) -> Result<Option<SubSkillRow>, StorageError> {
        let guard = self.lock()?;
        let tuple = (
            key.user_id.clone(),
            key.role_id.clone(),
            key.year_id.clone(),
            key.skill_name.clone(),
        );
        let Some(skill) = guard.skills.get(&tuple) else {
            return Ok(None);
        };
        Ok(guard.sub_skills.get(&(skill.id, sub_skill.clone())).cloned())
    }

    async fn list_skills(
        &self,
        user_id: &UserId,
        scope: Option<(&RoleId, &YearId)>,
    ) -> Result<Vec<SkillRecord>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<SkillRecord> = guard
            .skills
            .values()
            .filter(|row| &row.user_id == user_id)
            .filter(|row| {
                scope.is_none_or(|(role, year)| &row.role_id == role && &row.year_id == year)
            })
            .map(|row| guard.skill_record(row))
            .collect();
        out.sort_by(|a, b| {
            (&a.skill.role_id, &a.skill.year_id, &a.skill.skill_name).cmp(&(
                &b.skill.role_id,
                &b.skill.year_id,
                &b.skill.skill_name,
            ))
        });
        Ok(out)
    }

    async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetOutcome, StorageError> {
        let mut guard = self.lock()?;
        let ids: Vec<i64> = guard
            .skills
            .values()
            .filter(|row| &row.user_id == user_id && &row.role_id == role_id)
            .map(|row| row.id)
            .collect();

        let before = guard.sub_skills.len();
        guard
            .sub_skills
            .retain(|_, sub| !ids.contains(&sub.individual_skill_id));
        let deleted_items = (before - guard.sub_skills.len()) as u64;

        guard
            .skills
            .retain(|(user, role, _, _), _| !(user == user_id && role == role_id));

        Ok(ResetOutcome {
            deleted_items,
            deleted_parents: ids.len() as u64,
        })
    }
}

/// Aggregates progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub roadmap: Arc<dyn RoadmapProgressRepository>,
    pub skills: Arc<dyn SkillProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let roadmap: Arc<dyn RoadmapProgressRepository> = Arc::new(repo.clone());
        let skills: Arc<dyn SkillProgressRepository> = Arc::new(repo);
        Self { roadmap, skills }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_now;

    fn key() -> YearKey {
        YearKey::new(
            UserId::new("u1").unwrap(),
            RoleId::new("frontend").unwrap(),
            YearId::new("0-1").unwrap(),
        )
    }

    fn write(item_type: ItemType, index: u32, completed: bool) -> ItemWrite {
        ItemWrite {
            item_type,
            item_index: index,
            completed,
            notes: None,
            at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn first_touch_creates_one_parent_row() {
        let repo = InMemoryRepository::new();
        let counts = CatalogCounts::new(5, 2, 0, 0);
        repo.upsert_item(&key(), &write(ItemType::Skills, 0, true), counts)
            .await
            .unwrap();
        repo.upsert_item(&key(), &write(ItemType::Projects, 1, true), counts)
            .await
            .unwrap();

        assert_eq!(repo.progress_row_count().unwrap(), 1);
        let record = repo.get_year(&key()).await.unwrap().unwrap();
        assert_eq!(record.items.len(), 2);
        // 2 of 7
        assert!((record.progress.completion_percentage - 200.0 / 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn view_sizes_tracks_to_highest_index() {
        let repo = InMemoryRepository::new();
        repo.upsert_item(&key(), &write(ItemType::Skills, 2, true), CatalogCounts::default())
            .await
            .unwrap();
        let view = repo.get_year(&key()).await.unwrap().unwrap().into_view();
        assert_eq!(view.skills, vec![false, false, true]);
        assert!(view.projects.is_empty());
    }

    #[tokio::test]
    async fn reset_removes_children_and_parents() {
        let repo = InMemoryRepository::new();
        repo.upsert_item(&key(), &write(ItemType::Skills, 0, true), CatalogCounts::default())
            .await
            .unwrap();
        let outcome = RoadmapProgressRepository::reset_role(&repo, &key().user_id, &key().role_id)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResetOutcome {
                deleted_items: 1,
                deleted_parents: 1
            }
        );
        assert!(repo.get_year(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sub_skill_uncomplete_retains_notes() {
        let repo = InMemoryRepository::new();
        let skill = SkillKey::new(
            UserId::new("u1").unwrap(),
            RoleId::new("frontend").unwrap(),
            YearId::new("0-1").unwrap(),
            SkillName::new("css").unwrap(),
        );
        let grid = SubSkillName::new("grid").unwrap();
        repo.upsert_sub_skill(
            &skill,
            &grid,
            &SubSkillWrite {
                completed: true,
                notes: Some("notes A".into()),
                at: fixed_now(),
            },
        )
        .await
        .unwrap();
        let row = repo
            .upsert_sub_skill(
                &skill,
                &grid,
                &SubSkillWrite {
                    completed: false,
                    notes: None,
                    at: fixed_now(),
                },
            )
            .await
            .unwrap();

        assert!(!row.completed);
        assert_eq!(row.completed_at, None);
        assert_eq!(row.notes.as_deref(), Some("notes A"));
    }
}
