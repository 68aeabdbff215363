use std::sync::Arc;

use progress_core::catalog::Catalog;
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::roadmap_service::RoadmapProgressService;
use crate::skill_service::SkillProgressService;

/// Assembles the server-side progress services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    roadmap: Arc<RoadmapProgressService>,
    skills: Arc<SkillProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        max_connections: u32,
        clock: Clock,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url, max_connections).await?;
        Ok(Self::from_storage(&storage, clock, catalog))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, catalog: Arc<dyn Catalog>) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, catalog)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, catalog: Arc<dyn Catalog>) -> Self {
        let roadmap = Arc::new(RoadmapProgressService::new(
            clock,
            catalog,
            Arc::clone(&storage.roadmap),
        ));
        let skills = Arc::new(SkillProgressService::new(clock, Arc::clone(&storage.skills)));
        Self { roadmap, skills }
    }

    #[must_use]
    pub fn roadmap(&self) -> Arc<RoadmapProgressService> {
        Arc::clone(&self.roadmap)
    }

    #[must_use]
    pub fn skills(&self) -> Arc<SkillProgressService> {
        Arc::clone(&self.skills)
    }
}
