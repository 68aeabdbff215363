use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use progress_core::api::{ItemUpdate, ResetView, SnapshotSaved, assemble_tree};
use progress_core::catalog::Catalog;
use progress_core::model::{
    ItemType, ProgressTree, RoleId, SkillName, SkillProgress, SubSkillName, YearId, YearProgress,
    check_item_index,
};
use progress_core::recalc::{recalculate_role, recalculate_tree};

use super::api::{HttpProgressApi, ProgressApi, Session};
use super::cache::{FileCache, LocalCache, MemoryCache};
use super::config::SyncConfig;
use super::debounce::Debouncer;
use super::error::SyncError;
use super::store::ProgressStore;
use crate::Clock;

/// Where `load_snapshot` found the state it installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Cache,
    Empty,
}

/// Result of one bulk save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No session; nothing was sent.
    Skipped,
    Saved(SnapshotSaved),
    /// The save failed and the snapshot was written to the local cache.
    Cached,
}

/// Server responses of a role reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleReset {
    pub roadmap: ResetView,
    pub skills: ResetView,
}

struct Inner {
    clock: Clock,
    catalog: Arc<dyn Catalog>,
    api: Arc<dyn ProgressApi>,
    cache: Arc<dyn LocalCache>,
    store: ProgressStore,
    saver: Debouncer,
    save_lock: tokio::sync::Mutex<()>,
    session: RwLock<Option<Session>>,
}

/// Client-side progress state with optimistic updates and a debounced bulk save.
///
/// Mutations apply locally first, then send one fire-and-forget request and
/// reset the save timer. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn Catalog>,
        api: Arc<dyn ProgressApi>,
        cache: Arc<dyn LocalCache>,
        save_debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                catalog,
                api,
                cache,
                store: ProgressStore::default(),
                saver: Debouncer::new(save_debounce),
                save_lock: tokio::sync::Mutex::new(()),
                session: RwLock::new(None),
            }),
        }
    }

    /// Engine over `HttpProgressApi`, with a file cache when a path is configured.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` for invalid settings and `SyncError::Http`
    /// if the HTTP client cannot be built.
    pub fn from_config(
        config: &SyncConfig,
        clock: Clock,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self, SyncError> {
        let api: Arc<dyn ProgressApi> = Arc::new(HttpProgressApi::new(config)?);
        let cache: Arc<dyn LocalCache> = match &config.cache_path {
            Some(path) => Arc::new(FileCache::new(path.clone())),
            None => Arc::new(MemoryCache::new()),
        };
        Ok(Self::new(clock, catalog, api, cache, config.save_debounce()))
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.inner.store
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressTree {
        self.inner.store.get()
    }

    //
    // ─── SESSION ───────────────────────────────────────────────────────────────
    //

    pub fn start_session(&self, session: Session) {
        tracing::debug!(user_id = %session.user_id, "sync session started");
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Clear the session and cancel any pending save.
    pub fn end_session(&self) {
        self.inner.saver.cancel();
        self.inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session().is_some()
    }

    fn session(&self) -> Option<Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Set one item flag locally, recompute, send it and reschedule the save.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Invalid` for an out-of-range index; nothing changes.
    pub fn mark_item_complete(
        &self,
        role_id: &RoleId,
        year_id: &YearId,
        item_type: ItemType,
        item_index: u32,
        completed: bool,
    ) -> Result<YearProgress, SyncError> {
        let item_index = check_item_index(item_index)?;
        let now = self.inner.clock.now();
        let catalog = self.inner.catalog.as_ref();

        let mut updated = YearProgress::new(now);
        self.inner.store.mutate(|tree| {
            let role = tree.role_entry(role_id.clone());
            role.year_entry(year_id.clone(), now)
                .set_item(item_type, item_index, completed, now);
            recalculate_role(role, catalog);
            if let Some(year) = role.year(year_id) {
                updated = year.clone();
            }
        });

        if let Some(session) = self.session() {
            let api = Arc::clone(&self.inner.api);
            let (role_id, year_id) = (role_id.clone(), year_id.clone());
            tokio::spawn(async move {
                let update = ItemUpdate {
                    completed,
                    notes: None,
                };
                if let Err(e) = api
                    .put_item(&session, &role_id, &year_id, item_type, item_index, &update)
                    .await
                {
                    tracing::warn!(
                        role_id = %role_id,
                        year_id = %year_id,
                        item_type = %item_type,
                        item_index,
                        error = %e,
                        "item update failed, keeping local state"
                    );
                }
            });
        }

        self.schedule_save();
        Ok(updated)
    }

    /// Set one sub-skill locally, recompute, send it and reschedule the save.
    pub fn mark_sub_skill_complete(
        &self,
        role_id: &RoleId,
        year_id: &YearId,
        skill: &SkillName,
        sub_skill: &SubSkillName,
        completed: bool,
        notes: Option<String>,
    ) -> SkillProgress {
        let now = self.inner.clock.now();
        let catalog = self.inner.catalog.as_ref();

        let mut updated = SkillProgress::new();
        self.inner.store.mutate(|tree| {
            let role = tree.role_entry(role_id.clone());
            role.year_entry(year_id.clone(), now).apply_sub_skill(
                skill.clone(),
                sub_skill.clone(),
                completed,
                notes.clone(),
                now,
            );
            recalculate_role(role, catalog);
            if let Some(progress) = role.year(year_id).and_then(|y| y.skill(skill)) {
                updated = progress.clone();
            }
        });

        if let Some(session) = self.session() {
            let api = Arc::clone(&self.inner.api);
            let (role_id, year_id) = (role_id.clone(), year_id.clone());
            let (skill, sub_skill) = (skill.clone(), sub_skill.clone());
            tokio::spawn(async move {
                let update = ItemUpdate { completed, notes };
                if let Err(e) = api
                    .put_sub_skill(&session, &role_id, &year_id, &skill, &sub_skill, &update)
                    .await
                {
                    tracing::warn!(
                        role_id = %role_id,
                        year_id = %year_id,
                        skill = %skill,
                        sub_skill = %sub_skill,
                        error = %e,
                        "sub-skill update failed, keeping local state"
                    );
                }
            });
        }

        self.schedule_save();
        updated
    }

    /// Clear the role locally and from the cached snapshot, then delete it on
    /// the server.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoSession` without a session (local state is still
    /// cleared) or the first failing delete request.
    pub async fn reset_role(&self, role_id: &RoleId) -> Result<RoleReset, SyncError> {
        self.inner.store.mutate(|tree| {
            tree.remove_role(role_id);
        });
        self.forget_cached_role(role_id).await;

        let session = self.session().ok_or(SyncError::NoSession)?;
        let roadmap = self.inner.api.delete_role(&session, role_id).await?;
        let skills = self.inner.api.delete_skill_role(&session, role_id).await?;
        tracing::info!(
            role_id = %role_id,
            deleted_items = roadmap.deleted_items,
            deleted_sub_skills = skills.deleted_items,
            "role progress reset"
        );
        Ok(RoleReset { roadmap, skills })
    }

    //
    // ─── LOAD / EXPORT ─────────────────────────────────────────────────────────
    //

    /// Install the server state, falling back to the local cache, then to an
    /// empty tree. Every percentage is recomputed locally.
    ///
    /// Cached years newer than the server's replace them and trigger a save.
    pub async fn load_snapshot(&self) -> LoadSource {
        let remote = match self.session() {
            Some(session) => self.fetch_remote(&session).await,
            None => Err(SyncError::NoSession),
        };

        let (mut tree, source, merged) = match remote {
            Ok(mut tree) => {
                let merged = match self.cached_tree().await {
                    Some(cached) => merge_newer_years(&mut tree, &cached),
                    None => 0,
                };
                (tree, LoadSource::Remote, merged)
            }
            Err(e) => {
                if !matches!(e, SyncError::NoSession) {
                    tracing::warn!(error = %e, "remote load failed, falling back to local cache");
                }
                match self.cached_tree().await {
                    Some(cached) => (cached, LoadSource::Cache, 0),
                    None => (ProgressTree::new(), LoadSource::Empty, 0),
                }
            }
        };

        recalculate_tree(&mut tree, self.inner.catalog.as_ref());
        self.inner.store.replace(tree);
        if merged > 0 {
            self.schedule_save();
        }
        tracing::info!(?source, merged, "progress loaded");
        source
    }

    async fn fetch_remote(&self, session: &Session) -> Result<ProgressTree, SyncError> {
        let years = self.inner.api.fetch_snapshot(session).await?;
        let skills = self.inner.api.fetch_skills(session).await?;
        Ok(assemble_tree(years, skills, self.inner.clock.now()))
    }

    /// Drop the role from the cached snapshot so a later load cannot merge it back.
    async fn forget_cached_role(&self, role_id: &RoleId) {
        let Some(mut cached) = self.cached_tree().await else {
            return;
        };
        if cached.remove_role(role_id).is_none() {
            return;
        }
        let result = if cached.is_empty() {
            self.inner.cache.clear().await
        } else {
            match serde_json::to_string(&cached) {
                Ok(json) => self.inner.cache.write(&json).await,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize snapshot");
                    return;
                }
            }
        };
        if let Err(e) = result {
            tracing::warn!(role_id = %role_id, error = %e, "failed to drop reset role from local cache");
        }
    }

    /// Parsed cache contents; unreadable or malformed caches count as absent.
    async fn cached_tree(&self) -> Option<ProgressTree> {
        let raw = match self.inner.cache.read().await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "local cache unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(tree) => Some(tree),
            Err(e) => {
                tracing::warn!(error = %e, "local cache holds a malformed snapshot");
                None
            }
        }
    }

    /// Pretty-printed JSON of the whole tree.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Format` if serialization fails.
    pub fn export_snapshot(&self) -> Result<String, SyncError> {
        let tree = self.inner.store.get();
        Ok(serde_json::to_string_pretty(&tree)?)
    }

    /// Replace local state with an exported snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Format` for malformed input; local state is unchanged.
    pub fn import_snapshot(&self, data: &str) -> Result<(), SyncError> {
        let mut tree: ProgressTree = serde_json::from_str(data)?;
        recalculate_tree(&mut tree, self.inner.catalog.as_ref());
        self.inner.store.replace(tree);
        self.schedule_save();
        Ok(())
    }

    //
    // ─── SAVE ──────────────────────────────────────────────────────────────────
    //

    /// Send the whole tree now.
    ///
    /// On success the local cache is cleared; on failure the current tree is
    /// written to it. Saves run one at a time.
    pub async fn flush(&self) -> FlushOutcome {
        let Some(session) = self.session() else {
            tracing::debug!("no session, skipping save");
            return FlushOutcome::Skipped;
        };
        let _saving = self.inner.save_lock.lock().await;

        let tree = self.inner.store.get();
        match self.inner.api.save_snapshot(&session, &tree).await {
            Ok(saved) => {
                if let Err(e) = self.inner.cache.clear().await {
                    tracing::warn!(error = %e, "failed to clear local cache after save");
                }
                tracing::debug!(years = saved.years, items = saved.items, "progress saved");
                FlushOutcome::Saved(saved)
            }
            Err(e) => {
                tracing::warn!(error = %e, "bulk save failed, caching snapshot locally");
                let current = self.inner.store.get();
                match serde_json::to_string(&current) {
                    Ok(json) => {
                        if let Err(e) = self.inner.cache.write(&json).await {
                            tracing::warn!(error = %e, "failed to write local cache");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to serialize snapshot"),
                }
                FlushOutcome::Cached
            }
        }
    }

    fn schedule_save(&self) {
        let engine = self.clone();
        tracing::debug!(delay_ms = self.inner.saver.delay().as_millis(), "save scheduled");
        self.inner.saver.schedule(async move {
            engine.flush().await;
        });
    }

    #[must_use]
    pub fn save_pending(&self) -> bool {
        self.inner.saver.is_pending()
    }

    /// Cancel the pending save without ending the session.
    pub fn shutdown(&self) {
        self.inner.saver.cancel();
    }
}

/// Copy years from `cached` that are missing from or newer than `remote`.
fn merge_newer_years(remote: &mut ProgressTree, cached: &ProgressTree) -> usize {
    let mut merged = 0;
    for (role_id, year_id, year) in cached.years() {
        let newer = remote
            .year(role_id, year_id)
            .is_none_or(|server| year.last_updated() > server.last_updated());
        if newer {
            remote
                .role_entry(role_id.clone())
                .insert_year(year_id.clone(), year.clone());
            merged += 1;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use progress_core::api::{ItemView, SkillProgressView, SubSkillView, YearProgressView};
    use progress_core::catalog::{CatalogCounts, StaticCatalog};
    use progress_core::model::UserId;
    use progress_core::time::fixed_now;
    use reqwest::StatusCode;

    #[derive(Default)]
    struct FakeApi {
        down: AtomicBool,
        slow_saves: AtomicBool,
        saves_in_flight: AtomicUsize,
        max_saves_in_flight: AtomicUsize,
        years: Mutex<Vec<YearProgressView>>,
        calls: Mutex<Vec<String>>,
        saved: Mutex<Vec<ProgressTree>>,
    }

    impl FakeApi {
        fn down() -> Self {
            let api = Self::default();
            api.down.store(true, Ordering::SeqCst);
            api
        }

        fn record(&self, call: impl Into<String>) -> Result<(), SyncError> {
            self.calls.lock().unwrap().push(call.into());
            if self.down.load(Ordering::SeqCst) {
                return Err(SyncError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn saved(&self) -> Vec<ProgressTree> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressApi for FakeApi {
        async fn fetch_snapshot(&self, _: &Session) -> Result<Vec<YearProgressView>, SyncError> {
            self.record("fetch_snapshot")?;
            Ok(self.years.lock().unwrap().clone())
        }

        async fn fetch_skills(&self, _: &Session) -> Result<Vec<SkillProgressView>, SyncError> {
            self.record("fetch_skills")?;
            Ok(Vec::new())
        }

        async fn fetch_year(
            &self,
            _: &Session,
            role_id: &RoleId,
            year_id: &YearId,
        ) -> Result<YearProgressView, SyncError> {
            self.record("fetch_year")?;
            Ok(YearProgressView::empty(role_id.clone(), year_id.clone()))
        }

        async fn put_item(
            &self,
            _: &Session,
            _: &RoleId,
            _: &YearId,
            item_type: ItemType,
            item_index: u32,
            update: &ItemUpdate,
        ) -> Result<ItemView, SyncError> {
            self.record(format!("put_item {item_type} {item_index}"))?;
            Ok(ItemView {
                item_type,
                item_index,
                completed: update.completed,
                completed_at: None,
                notes: update.notes.clone(),
                updated_at: fixed_now(),
            })
        }

        async fn put_sub_skill(
            &self,
            _: &Session,
            role_id: &RoleId,
            year_id: &YearId,
            skill: &SkillName,
            sub_skill: &SubSkillName,
            update: &ItemUpdate,
        ) -> Result<SubSkillView, SyncError> {
            self.record(format!("put_sub_skill {skill} {sub_skill}"))?;
            Ok(SubSkillView {
                role_id: role_id.clone(),
                year_id: year_id.clone(),
                skill_name: skill.clone(),
                sub_skill_name: sub_skill.clone(),
                completed: update.completed,
                completed_at: None,
                notes: update.notes.clone(),
                updated_at: fixed_now(),
            })
        }

        async fn save_snapshot(
            &self,
            _: &Session,
            tree: &ProgressTree,
        ) -> Result<SnapshotSaved, SyncError> {
            self.record("save_snapshot")?;
            let in_flight = self.saves_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_saves_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            if self.slow_saves.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.saves_in_flight.fetch_sub(1, Ordering::SeqCst);
            self.saved.lock().unwrap().push(tree.clone());
            Ok(SnapshotSaved::default())
        }

        async fn delete_role(&self, _: &Session, role_id: &RoleId) -> Result<ResetView, SyncError> {
            self.record(format!("delete_role {role_id}"))?;
            Ok(ResetView::default())
        }

        async fn delete_skill_role(
            &self,
            _: &Session,
            role_id: &RoleId,
        ) -> Result<ResetView, SyncError> {
            self.record(format!("delete_skill_role {role_id}"))?;
            Ok(ResetView::default())
        }
    }

    fn frontend() -> RoleId {
        RoleId::new("frontend").unwrap()
    }

    fn first_year() -> YearId {
        YearId::new("0-1").unwrap()
    }

    fn session() -> Session {
        Session::new(UserId::new("u1").unwrap(), "token-u1")
    }

    fn engine(api: Arc<FakeApi>, cache: Arc<MemoryCache>) -> SyncEngine {
        let catalog = StaticCatalog::new().with_entry(frontend(), first_year(), CatalogCounts::new(5, 0, 0, 0));
        SyncEngine::new(
            Clock::Fixed(fixed_now()),
            Arc::new(catalog),
            api,
            cache,
            Duration::from_millis(1000),
        )
    }

    async fn past_debounce() {
        tokio::time::sleep(Duration::from_millis(1100)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn marking_one_of_five_skills_is_twenty_percent() {
        let engine = engine(Arc::new(FakeApi::default()), Arc::new(MemoryCache::new()));
        let year = engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 2, true)
            .unwrap();

        assert_eq!(year.track(ItemType::Skills).to_vec(), vec![false, false, true]);
        assert_eq!(year.completion_percentage(), 20.0);
        let tree = engine.snapshot();
        assert_eq!(tree.role(&frontend()).unwrap().overall_progress(), 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn marking_twice_equals_marking_once() {
        let engine = engine(Arc::new(FakeApi::default()), Arc::new(MemoryCache::new()));
        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Projects, 0, true)
            .unwrap();
        let once = engine.snapshot();
        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Projects, 0, true)
            .unwrap();
        assert_eq!(engine.snapshot(), once);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_skill_uncompletion_keeps_notes() {
        let engine = engine(Arc::new(FakeApi::default()), Arc::new(MemoryCache::new()));
        let css = SkillName::new("css").unwrap();
        let grid = SubSkillName::new("grid").unwrap();

        let skill = engine.mark_sub_skill_complete(
            &frontend(),
            &first_year(),
            &css,
            &grid,
            true,
            Some("notes A".into()),
        );
        assert_eq!(skill.overall_progress(), 100.0);
        assert_eq!(skill.sub_skill(&grid).unwrap().completed_at, Some(fixed_now()));

        let skill = engine.mark_sub_skill_complete(&frontend(), &first_year(), &css, &grid, false, None);
        let sub = skill.sub_skill(&grid).unwrap();
        assert!(!sub.completed);
        assert_eq!(sub.completed_at, None);
        assert_eq!(sub.notes.as_deref(), Some("notes A"));
        assert_eq!(skill.overall_progress(), 0.0);

        let tree = engine.snapshot();
        // sub-skills never count toward the four tracks
        assert_eq!(tree.year(&frontend(), &first_year()).unwrap().completion_percentage(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_mutations_coalesce_into_one_save() {
        let api = Arc::new(FakeApi::default());
        let engine = engine(Arc::clone(&api), Arc::new(MemoryCache::new()));
        engine.start_session(session());

        for index in 0..5 {
            engine
                .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, index, true)
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(engine.save_pending());
        past_debounce().await;

        let saved = api.saved();
        assert_eq!(saved.len(), 1);
        let year = saved[0].year(&frontend(), &first_year()).unwrap();
        assert_eq!(year.track(ItemType::Skills).completed_count(), 5);

        let puts = api.calls().iter().filter(|c| c.starts_with("put_item")).count();
        assert_eq!(puts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_without_session_is_skipped() {
        let api = Arc::new(FakeApi::default());
        let engine = engine(Arc::clone(&api), Arc::new(MemoryCache::new()));
        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 0, true)
            .unwrap();
        past_debounce().await;

        assert_eq!(engine.flush().await, FlushOutcome::Skipped);
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_caches_current_snapshot() {
        let api = Arc::new(FakeApi::down());
        let cache = Arc::new(MemoryCache::new());
        let engine = engine(api, Arc::clone(&cache));
        engine.start_session(session());

        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 1, true)
            .unwrap();
        past_debounce().await;

        let cached: ProgressTree = serde_json::from_str(&cache.contents().expect("cache written")).unwrap();
        assert_eq!(cached, engine.snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_save_clears_cache() {
        let cache = Arc::new(MemoryCache::with_contents(r#"{"roles":{}}"#));
        let engine = engine(Arc::new(FakeApi::default()), Arc::clone(&cache));
        engine.start_session(session());

        assert!(matches!(engine.flush().await, FlushOutcome::Saved(_)));
        assert_eq!(cache.contents(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_flushes_save_one_at_a_time() {
        let api = Arc::new(FakeApi::default());
        api.slow_saves.store(true, Ordering::SeqCst);
        let engine = engine(Arc::clone(&api), Arc::new(MemoryCache::new()));
        engine.start_session(session());

        let (first, second) = tokio::join!(engine.flush(), engine.flush());
        assert!(matches!(first, FlushOutcome::Saved(_)));
        assert!(matches!(second, FlushOutcome::Saved(_)));
        assert_eq!(api.saved().len(), 2);
        assert_eq!(api.max_saves_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_role_is_not_restored_from_cache() {
        let api = Arc::new(FakeApi::down());
        let cache = Arc::new(MemoryCache::new());
        let engine = engine(Arc::clone(&api), Arc::clone(&cache));
        engine.start_session(session());

        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 1, true)
            .unwrap();
        assert_eq!(engine.flush().await, FlushOutcome::Cached);
        assert!(cache.contents().is_some());
        engine.shutdown();

        api.down.store(false, Ordering::SeqCst);
        engine.reset_role(&frontend()).await.unwrap();
        assert_eq!(cache.contents(), None);

        assert_eq!(engine.load_snapshot().await, LoadSource::Remote);
        assert!(engine.snapshot().role(&frontend()).is_none());
        assert!(!engine.save_pending());
        past_debounce().await;
        assert!(api.saved().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_role_keeps_other_cached_roles() {
        let backend = RoleId::new("backend").unwrap();
        let api = Arc::new(FakeApi::down());
        let cache = Arc::new(MemoryCache::new());
        let engine = engine(Arc::clone(&api), Arc::clone(&cache));
        engine.start_session(session());

        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 1, true)
            .unwrap();
        engine
            .mark_item_complete(&backend, &first_year(), ItemType::Projects, 0, true)
            .unwrap();
        assert_eq!(engine.flush().await, FlushOutcome::Cached);
        engine.shutdown();

        api.down.store(false, Ordering::SeqCst);
        engine.reset_role(&frontend()).await.unwrap();
        let cached: ProgressTree = serde_json::from_str(&cache.contents().expect("cache kept")).unwrap();
        assert!(cached.role(&frontend()).is_none());
        assert!(cached.role(&backend).is_some());

        assert_eq!(engine.load_snapshot().await, LoadSource::Remote);
        past_debounce().await;
        let saved = api.saved();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].role(&frontend()).is_none());
        assert!(saved[0].role(&backend).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_cancels_pending_save() {
        let api = Arc::new(FakeApi::default());
        let engine = engine(Arc::clone(&api), Arc::new(MemoryCache::new()));
        engine.start_session(session());
        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 0, true)
            .unwrap();
        engine.end_session();
        assert!(!engine.has_session());
        past_debounce().await;

        assert!(api.saved().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn load_falls_back_to_cache_then_empty() {
        let mut cached = ProgressTree::new();
        cached
            .role_entry(frontend())
            .year_entry(first_year(), fixed_now())
            .set_item(ItemType::Skills, 0, true, fixed_now());
        let cache = Arc::new(MemoryCache::with_contents(serde_json::to_string(&cached).unwrap()));

        let engine = engine(Arc::new(FakeApi::down()), Arc::clone(&cache));
        engine.start_session(session());
        assert_eq!(engine.load_snapshot().await, LoadSource::Cache);
        let tree = engine.snapshot();
        assert_eq!(tree.year(&frontend(), &first_year()).unwrap().completion_percentage(), 20.0);

        cache.write("not json").await.unwrap();
        assert_eq!(engine.load_snapshot().await, LoadSource::Empty);
        assert!(engine.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_load_recomputes_and_merges_newer_cache() {
        let api = Arc::new(FakeApi::default());
        let mut year = YearProgressView::empty(frontend(), first_year());
        year.skills = vec![true, true];
        year.completion_percentage = 99.0;
        year.last_updated = Some(fixed_now());
        api.years.lock().unwrap().push(year);

        let later = fixed_now() + ChronoDuration::minutes(5);
        let mut cached = ProgressTree::new();
        cached
            .role_entry(RoleId::new("backend").unwrap())
            .year_entry(first_year(), later)
            .set_item(ItemType::Projects, 0, true, later);
        let cached_old = {
            let mut tree = cached.clone();
            tree.role_entry(frontend())
                .year_entry(first_year(), fixed_now() - ChronoDuration::days(1));
            tree
        };
        let cache = Arc::new(MemoryCache::with_contents(serde_json::to_string(&cached_old).unwrap()));

        let engine = engine(Arc::clone(&api), cache);
        engine.start_session(session());
        assert_eq!(engine.load_snapshot().await, LoadSource::Remote);

        let tree = engine.snapshot();
        let front = tree.year(&frontend(), &first_year()).unwrap();
        assert_eq!(front.track(ItemType::Skills).to_vec(), vec![true, true]);
        assert_eq!(front.completion_percentage(), 40.0);
        assert!(tree.role(&RoleId::new("backend").unwrap()).is_some());

        assert!(engine.save_pending());
        past_debounce().await;
        assert_eq!(api.saved().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_import_leaves_state_unchanged() {
        let engine = engine(Arc::new(FakeApi::default()), Arc::new(MemoryCache::new()));
        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 0, true)
            .unwrap();
        let before = engine.snapshot();

        let err = engine.import_snapshot("{ not json").unwrap_err();
        assert!(matches!(err, SyncError::Format(_)));
        assert_eq!(engine.snapshot(), before);

        let exported = engine.export_snapshot().unwrap();
        engine.import_snapshot(&exported).unwrap();
        assert_eq!(engine.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_local_role_and_calls_both_deletes() {
        let api = Arc::new(FakeApi::default());
        let engine = engine(Arc::clone(&api), Arc::new(MemoryCache::new()));
        engine.start_session(session());
        engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, 0, true)
            .unwrap();

        engine.reset_role(&frontend()).await.unwrap();
        assert!(engine.snapshot().role(&frontend()).is_none());
        let calls = api.calls();
        assert!(calls.contains(&"delete_role frontend".to_string()));
        assert!(calls.contains(&"delete_skill_role frontend".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_index_is_rejected() {
        let engine = engine(Arc::new(FakeApi::default()), Arc::new(MemoryCache::new()));
        let err = engine
            .mark_item_complete(&frontend(), &first_year(), ItemType::Skills, u32::MAX, true)
            .unwrap_err();
        assert!(matches!(err, SyncError::Invalid(_)));
        assert!(engine.snapshot().is_empty());
        assert!(!engine.save_pending());
    }
}
