use std::sync::Arc;

use progress_core::api::{ItemUpdate, ItemView, ResetView, YearProgressView};
use progress_core::catalog::Catalog;
use progress_core::model::{
    ItemType, ProgressTree, RoleId, UserId, YearId, YearProgress, check_item_index,
};
use progress_core::recalc::completion_from_totals;
use storage::repository::{ItemWrite, RoadmapProgressRepository, YearKey, YearRecord};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Roadmap track progress for authenticated users.
#[derive(Clone)]
pub struct RoadmapProgressService {
    clock: Clock,
    catalog: Arc<dyn Catalog>,
    roadmap: Arc<dyn RoadmapProgressRepository>,
}

/// Rows touched by a bulk roadmap save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoadmapSaved {
    pub years: u64,
    pub items: u64,
}

impl RoadmapProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn Catalog>,
        roadmap: Arc<dyn RoadmapProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            roadmap,
        }
    }

    /// Every stored (role, year) of the user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn snapshot(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<YearProgressView>, ProgressServiceError> {
        let records = self.roadmap.list_years(user_id).await?;
        Ok(records.into_iter().map(|r| self.view(r)).collect())
    }

    /// One (role, year); a zeroed default when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn year(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
        year_id: &YearId,
    ) -> Result<YearProgressView, ProgressServiceError> {
        let key = YearKey::new(user_id.clone(), role_id.clone(), year_id.clone());
        let record = self.roadmap.get_year(&key).await?;
        Ok(record.map_or_else(
            || YearProgressView::empty(role_id.clone(), year_id.clone()),
            |r| self.view(r),
        ))
    }

    /// Upsert one item with its full desired state.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Validation` for an out-of-range index.
    /// Returns `ProgressServiceError::Storage` if the transaction fails.
    pub async fn update_item(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
        year_id: &YearId,
        item_type: ItemType,
        item_index: u32,
        update: ItemUpdate,
    ) -> Result<ItemView, ProgressServiceError> {
        let item_index = check_item_index(item_index)?;
        let key = YearKey::new(user_id.clone(), role_id.clone(), year_id.clone());
        let write = ItemWrite {
            item_type,
            item_index,
            completed: update.completed,
            notes: update.notes,
            at: self.clock.now(),
        };
        let counts = self.catalog.counts(role_id, year_id);
        let row = self.roadmap.upsert_item(&key, &write, counts).await?;
        Ok(row.to_view())
    }

    /// Persist every (role, year) of a client tree, one transaction per year.
    ///
    /// Every touched index is written with its current flag, so items that
    /// were un-completed locally are un-completed on the server too.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Validation` for an out-of-range index.
    /// Returns `ProgressServiceError::Storage` if a transaction fails; years
    /// saved before the failure stay saved.
    pub async fn save_snapshot(
        &self,
        user_id: &UserId,
        tree: &ProgressTree,
    ) -> Result<RoadmapSaved, ProgressServiceError> {
        let now = self.clock.now();
        let mut saved = RoadmapSaved::default();

        for (role_id, year_id, year) in tree.years() {
            let writes = year_writes(year, now)?;
            let key = YearKey::new(user_id.clone(), role_id.clone(), year_id.clone());
            let counts = self.catalog.counts(role_id, year_id);
            self.roadmap
                .upsert_year(&key, &writes, counts, year.last_updated())
                .await?;
            saved.years += 1;
            saved.items += writes.len() as u64;
        }

        tracing::debug!(user_id = %user_id, years = saved.years, items = saved.items, "roadmap snapshot saved");
        Ok(saved)
    }

    /// Delete every roadmap row of the role.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the transaction fails.
    pub async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetView, ProgressServiceError> {
        let outcome = self.roadmap.reset_role(user_id, role_id).await?;
        Ok(ResetView {
            deleted_items: outcome.deleted_items,
            deleted_parents: outcome.deleted_parents,
        })
    }

    /// Percentages are recomputed against the current catalog on read.
    fn view(&self, record: YearRecord) -> YearProgressView {
        let counts = self
            .catalog
            .counts(&record.progress.role_id, &record.progress.year_id);
        let completed = record.items.iter().filter(|item| item.completed).count() as u64;
        let mut view = record.into_view();
        view.completion_percentage = completion_from_totals(completed, counts.total());
        view
    }
}

fn year_writes(
    year: &YearProgress,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<ItemWrite>, ProgressServiceError> {
    let mut writes = Vec::new();
    for item_type in ItemType::ALL {
        for (index, completed) in year.track(item_type).entries() {
            writes.push(ItemWrite {
                item_type,
                item_index: check_item_index(index)?,
                completed,
                notes: None,
                at: now,
            });
        }
    }
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use progress_core::catalog::{CatalogCounts, StaticCatalog};
    use progress_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn ids() -> (UserId, RoleId, YearId) {
        (
            UserId::new("u1").unwrap(),
            RoleId::new("frontend").unwrap(),
            YearId::new("0-1").unwrap(),
        )
    }

    fn service(repo: InMemoryRepository) -> RoadmapProgressService {
        let (_, role_id, year_id) = ids();
        let catalog = StaticCatalog::new().with_entry(role_id, year_id, CatalogCounts::new(5, 0, 0, 0));
        RoadmapProgressService::new(Clock::Fixed(fixed_now()), Arc::new(catalog), Arc::new(repo))
    }

    #[tokio::test]
    async fn absent_year_reads_as_zeroed_default() {
        let service = service(InMemoryRepository::new());
        let (user_id, role_id, year_id) = ids();
        let view = service.year(&user_id, &role_id, &year_id).await.unwrap();
        assert_eq!(view, YearProgressView::empty(role_id, year_id));
    }

    #[tokio::test]
    async fn update_item_reports_stored_state() {
        let service = service(InMemoryRepository::new());
        let (user_id, role_id, year_id) = ids();
        let item = service
            .update_item(
                &user_id,
                &role_id,
                &year_id,
                ItemType::Skills,
                2,
                ItemUpdate {
                    completed: true,
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(item.completed_at, Some(fixed_now()));

        let view = service.year(&user_id, &role_id, &year_id).await.unwrap();
        assert_eq!(view.skills, vec![false, false, true]);
        assert_eq!(view.completion_percentage, 20.0);
    }

    #[tokio::test]
    async fn oversized_index_is_rejected_before_storage() {
        let repo = InMemoryRepository::new();
        let service = service(repo.clone());
        let (user_id, role_id, year_id) = ids();
        let err = service
            .update_item(
                &user_id,
                &role_id,
                &year_id,
                ItemType::Projects,
                u32::MAX,
                ItemUpdate {
                    completed: true,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::Validation(_)));
        assert_eq!(repo.progress_row_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn save_snapshot_writes_uncompleted_items_too() {
        let repo = InMemoryRepository::new();
        let service = service(repo);
        let (user_id, role_id, year_id) = ids();

        let mut tree = ProgressTree::new();
        let year = tree
            .role_entry(role_id.clone())
            .year_entry(year_id.clone(), fixed_now());
        year.set_item(ItemType::Skills, 0, true, fixed_now());
        year.set_item(ItemType::Skills, 1, true, fixed_now());
        service.save_snapshot(&user_id, &tree).await.unwrap();

        let year = tree.role_mut(&role_id).unwrap().year_mut(&year_id).unwrap();
        year.set_item(ItemType::Skills, 1, false, fixed_now());
        let saved = service.save_snapshot(&user_id, &tree).await.unwrap();
        assert_eq!(saved, RoadmapSaved { years: 1, items: 2 });

        let view = service.year(&user_id, &role_id, &year_id).await.unwrap();
        assert_eq!(view.skills, vec![true, false]);
        assert_eq!(view.completion_percentage, 20.0);
    }

    #[tokio::test]
    async fn reloaded_tree_saves_only_touched_items() {
        let repo = InMemoryRepository::new();
        let service = service(repo.clone());
        let (user_id, role_id, year_id) = ids();
        service
            .update_item(
                &user_id,
                &role_id,
                &year_id,
                ItemType::Skills,
                2,
                ItemUpdate {
                    completed: true,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let years = service.snapshot(&user_id).await.unwrap();
        let tree = progress_core::api::assemble_tree(years, Vec::new(), fixed_now());
        let saved = service.save_snapshot(&user_id, &tree).await.unwrap();
        assert_eq!(saved.items, 1);

        let key = YearKey::new(user_id.clone(), role_id.clone(), year_id.clone());
        let record = repo.get_year(&key).await.unwrap().unwrap();
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].item_index, 2);
    }
}
