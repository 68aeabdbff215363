use std::sync::Arc;

use progress_core::api::{ItemUpdate, ResetView, SkillProgressView, SubSkillView};
use progress_core::model::{ProgressTree, RoleId, SkillName, SubSkillName, UserId, YearId};
use storage::repository::{SkillKey, SkillProgressRepository, SubSkillWrite};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Named-skill progress, keyed by (skill, sub-skill) within a (role, year).
#[derive(Clone)]
pub struct SkillProgressService {
    clock: Clock,
    skills: Arc<dyn SkillProgressRepository>,
}

impl SkillProgressService {
    #[must_use]
    pub fn new(clock: Clock, skills: Arc<dyn SkillProgressRepository>) -> Self {
        Self { clock, skills }
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn list(&self, user_id: &UserId) -> Result<Vec<SkillProgressView>, ProgressServiceError> {
        let records = self.skills.list_skills(user_id, None).await?;
        Ok(records.into_iter().map(|r| r.into_view()).collect())
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn list_year(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
        year_id: &YearId,
    ) -> Result<Vec<SkillProgressView>, ProgressServiceError> {
        let records = self
            .skills
            .list_skills(user_id, Some((role_id, year_id)))
            .await?;
        Ok(records.into_iter().map(|r| r.into_view()).collect())
    }

    /// Upsert one sub-skill with its full desired state.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the transaction fails.
    pub async fn update_sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
        update: ItemUpdate,
    ) -> Result<SubSkillView, ProgressServiceError> {
        let write = SubSkillWrite {
            completed: update.completed,
            notes: update.notes,
            at: self.clock.now(),
        };
        let row = self.skills.upsert_sub_skill(key, sub_skill, &write).await?;
        Ok(row.to_view(key))
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::NotFound` if the sub-skill was never tracked.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn sub_skill(
        &self,
        key: &SkillKey,
        sub_skill: &SubSkillName,
    ) -> Result<SubSkillView, ProgressServiceError> {
        let row = self
            .skills
            .get_sub_skill(key, sub_skill)
            .await?
            .ok_or(ProgressServiceError::NotFound)?;
        Ok(row.to_view(key))
    }

    /// Persist every named skill of a client tree, one transaction per skill.
    ///
    /// A sub-skill's client `completedAt` is used as its completion stamp when
    /// the server has none.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if a transaction fails.
    pub async fn save_snapshot(
        &self,
        user_id: &UserId,
        tree: &ProgressTree,
    ) -> Result<u64, ProgressServiceError> {
        let now = self.clock.now();
        let mut saved = 0u64;

        for (role_id, year_id, year) in tree.years() {
            for (skill_name, skill) in year.skill_progress() {
                let key = SkillKey::new(
                    user_id.clone(),
                    role_id.clone(),
                    year_id.clone(),
                    skill_name.clone(),
                );
                let writes: Vec<(SubSkillName, SubSkillWrite)> = skill
                    .sub_skills()
                    .iter()
                    .map(|(name, sub)| {
                        (
                            name.clone(),
                            SubSkillWrite {
                                completed: sub.completed,
                                notes: sub.notes.clone(),
                                at: sub.completed_at.unwrap_or(now),
                            },
                        )
                    })
                    .collect();
                self.skills.upsert_skill(&key, &writes, now).await?;
                saved += writes.len() as u64;
            }
        }

        Ok(saved)
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the transaction fails.
    pub async fn reset_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<ResetView, ProgressServiceError> {
        let outcome = self.skills.reset_role(user_id, role_id).await?;
        Ok(ResetView {
            deleted_items: outcome.deleted_items,
            deleted_parents: outcome.deleted_parents,
        })
    }
}

/// Key for one named skill of a user.
#[must_use]
pub fn skill_key(user_id: &UserId, role_id: &RoleId, year_id: &YearId, skill: &SkillName) -> SkillKey {
    SkillKey::new(user_id.clone(), role_id.clone(), year_id.clone(), skill.clone())
}
