use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{RoleId, SkillName, SubSkillName, YearId};
use crate::model::item::{ItemTrack, ItemType, merge_notes, next_completed_at};

//
// ─── SUB-SKILL ─────────────────────────────────────────────────────────────────
//

/// Completion state of one sub-skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSkillProgress {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SubSkillProgress {
    /// Applies a write following the item transition rules.
    pub fn apply(&mut self, completed: bool, notes: Option<String>, now: DateTime<Utc>) {
        self.completed_at = next_completed_at(self.completed_at, completed, now);
        self.completed = completed;
        self.notes = merge_notes(self.notes.take(), notes);
    }
}

//
// ─── INDIVIDUAL SKILL ──────────────────────────────────────────────────────────
//

/// Named-skill progress; `overall_progress` covers touched sub-skills only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillProgress {
    #[serde(default)]
    sub_skills: BTreeMap<SubSkillName, SubSkillProgress>,
    #[serde(default)]
    overall_progress: f64,
}

impl SkillProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_sub_skills(sub_skills: BTreeMap<SubSkillName, SubSkillProgress>) -> Self {
        Self {
            sub_skills,
            overall_progress: 0.0,
        }
    }

    #[must_use]
    pub fn sub_skills(&self) -> &BTreeMap<SubSkillName, SubSkillProgress> {
        &self.sub_skills
    }

    #[must_use]
    pub fn sub_skill(&self, name: &SubSkillName) -> Option<&SubSkillProgress> {
        self.sub_skills.get(name)
    }

    #[must_use]
    pub fn overall_progress(&self) -> f64 {
        self.overall_progress
    }

    pub(crate) fn set_overall_progress(&mut self, value: f64) {
        self.overall_progress = value;
    }

    /// Get-or-create the sub-skill and apply the write.
    pub fn apply_sub_skill(
        &mut self,
        name: SubSkillName,
        completed: bool,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> &SubSkillProgress {
        let entry = self.sub_skills.entry(name).or_insert(SubSkillProgress {
            completed: false,
            completed_at: None,
            notes: None,
        });
        entry.apply(completed, notes, now);
        entry
    }
}

//
// ─── YEAR ──────────────────────────────────────────────────────────────────────
//

/// Progress for one (role, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearProgress {
    #[serde(default)]
    skills: ItemTrack,
    #[serde(default)]
    projects: ItemTrack,
    #[serde(default)]
    free_resources: ItemTrack,
    #[serde(default)]
    paid_resources: ItemTrack,
    #[serde(default)]
    skill_progress: BTreeMap<SkillName, SkillProgress>,
    #[serde(default)]
    completion_percentage: f64,
    last_updated: DateTime<Utc>,
}

impl YearProgress {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            skills: ItemTrack::new(),
            projects: ItemTrack::new(),
            free_resources: ItemTrack::new(),
            paid_resources: ItemTrack::new(),
            skill_progress: BTreeMap::new(),
            completion_percentage: 0.0,
            last_updated: now,
        }
    }

    /// Rebuild a year from raw track data. Derived fields start at zero.
    #[must_use]
    pub fn from_tracks(
        skills: ItemTrack,
        projects: ItemTrack,
        free_resources: ItemTrack,
        paid_resources: ItemTrack,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            skills,
            projects,
            free_resources,
            paid_resources,
            skill_progress: BTreeMap::new(),
            completion_percentage: 0.0,
            last_updated,
        }
    }

    #[must_use]
    pub fn track(&self, item_type: ItemType) -> &ItemTrack {
        match item_type {
            ItemType::Skills => &self.skills,
            ItemType::Projects => &self.projects,
            ItemType::FreeResources => &self.free_resources,
            ItemType::PaidResources => &self.paid_resources,
        }
    }

    fn track_mut(&mut self, item_type: ItemType) -> &mut ItemTrack {
        match item_type {
            ItemType::Skills => &mut self.skills,
            ItemType::Projects => &mut self.projects,
            ItemType::FreeResources => &mut self.free_resources,
            ItemType::PaidResources => &mut self.paid_resources,
        }
    }

    /// Set one item flag and bump `last_updated`.
    pub fn set_item(&mut self, item_type: ItemType, index: u32, completed: bool, now: DateTime<Utc>) {
        self.track_mut(item_type).set(index, completed);
        self.last_updated = now;
    }

    /// Apply a sub-skill write, creating the skill entry if needed.
    pub fn apply_sub_skill(
        &mut self,
        skill: SkillName,
        sub_skill: SubSkillName,
        completed: bool,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> &mut SkillProgress {
        self.last_updated = now;
        let entry = self.skill_progress.entry(skill).or_default();
        entry.apply_sub_skill(sub_skill, completed, notes, now);
        entry
    }

    pub fn insert_skill(&mut self, name: SkillName, skill: SkillProgress) {
        self.skill_progress.insert(name, skill);
    }

    #[must_use]
    pub fn skill(&self, name: &SkillName) -> Option<&SkillProgress> {
        self.skill_progress.get(name)
    }

    #[must_use]
    pub fn skill_progress(&self) -> &BTreeMap<SkillName, SkillProgress> {
        &self.skill_progress
    }

    pub(crate) fn skill_progress_mut(&mut self) -> impl Iterator<Item = &mut SkillProgress> {
        self.skill_progress.values_mut()
    }

    /// Completed entries across all four tracks.
    #[must_use]
    pub fn completed_items(&self) -> u64 {
        ItemType::ALL
            .iter()
            .map(|t| self.track(*t).completed_count())
            .sum()
    }

    #[must_use]
    pub fn completion_percentage(&self) -> f64 {
        self.completion_percentage
    }

    pub(crate) fn set_completion_percentage(&mut self, value: f64) {
        self.completion_percentage = value;
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

//
// ─── ROLE ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleProgress {
    role_id: RoleId,
    #[serde(default)]
    years: BTreeMap<YearId, YearProgress>,
    #[serde(default)]
    overall_progress: f64,
}

impl RoleProgress {
    #[must_use]
    pub fn new(role_id: RoleId) -> Self {
        Self {
            role_id,
            years: BTreeMap::new(),
            overall_progress: 0.0,
        }
    }

    #[must_use]
    pub fn role_id(&self) -> &RoleId {
        &self.role_id
    }

    #[must_use]
    pub fn years(&self) -> &BTreeMap<YearId, YearProgress> {
        &self.years
    }

    #[must_use]
    pub fn year(&self, year_id: &YearId) -> Option<&YearProgress> {
        self.years.get(year_id)
    }

    pub fn year_mut(&mut self, year_id: &YearId) -> Option<&mut YearProgress> {
        self.years.get_mut(year_id)
    }

    pub(crate) fn years_mut(&mut self) -> impl Iterator<Item = (&YearId, &mut YearProgress)> {
        self.years.iter_mut()
    }

    /// Get-or-create the year entry.
    pub fn year_entry(&mut self, year_id: YearId, now: DateTime<Utc>) -> &mut YearProgress {
        self.years
            .entry(year_id)
            .or_insert_with(|| YearProgress::new(now))
    }

    pub fn insert_year(&mut self, year_id: YearId, year: YearProgress) {
        self.years.insert(year_id, year);
    }

    #[must_use]
    pub fn overall_progress(&self) -> f64 {
        self.overall_progress
    }

    pub(crate) fn set_overall_progress(&mut self, value: f64) {
        self.overall_progress = value;
    }
}

//
// ─── TREE ──────────────────────────────────────────────────────────────────────
//

/// Whole client-side progress state for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTree {
    #[serde(default)]
    roles: BTreeMap<RoleId, RoleProgress>,
}

impl ProgressTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeMap<RoleId, RoleProgress> {
        &self.roles
    }

    #[must_use]
    pub fn role(&self, role_id: &RoleId) -> Option<&RoleProgress> {
        self.roles.get(role_id)
    }

    pub fn role_mut(&mut self, role_id: &RoleId) -> Option<&mut RoleProgress> {
        self.roles.get_mut(role_id)
    }

    pub(crate) fn roles_mut(&mut self) -> impl Iterator<Item = &mut RoleProgress> {
        self.roles.values_mut()
    }

    /// Get-or-create the role entry.
    pub fn role_entry(&mut self, role_id: RoleId) -> &mut RoleProgress {
        self.roles
            .entry(role_id.clone())
            .or_insert_with(|| RoleProgress::new(role_id))
    }

    #[must_use]
    pub fn year(&self, role_id: &RoleId, year_id: &YearId) -> Option<&YearProgress> {
        self.roles.get(role_id).and_then(|r| r.year(year_id))
    }

    pub fn remove_role(&mut self, role_id: &RoleId) -> Option<RoleProgress> {
        self.roles.remove(role_id)
    }

    /// Iterate every `(role, year, progress)` triple.
    pub fn years(&self) -> impl Iterator<Item = (&RoleId, &YearId, &YearProgress)> {
        self.roles.iter().flat_map(|(role_id, role)| {
            role.years()
                .iter()
                .map(move |(year_id, year)| (role_id, year_id, year))
        })
    }
}
