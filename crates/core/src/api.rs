//! JSON shapes exchanged between the progress server and its clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    ItemTrack, ItemType, ProgressTree, RoleId, SkillName, SkillProgress, SubSkillName,
    SubSkillProgress, YearId, YearProgress,
};

/// Body of the item and sub-skill PUT endpoints.
///
/// Carries the full desired value, never a delta, so repeated or reordered
/// requests converge on whichever lands last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One (role, year) as returned by the roadmap read endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearProgressView {
    pub role_id: RoleId,
    pub year_id: YearId,
    pub skills: Vec<bool>,
    pub projects: Vec<bool>,
    pub free_resources: Vec<bool>,
    pub paid_resources: Vec<bool>,
    pub completion_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl YearProgressView {
    /// Zeroed default for a (role, year) with no stored row.
    #[must_use]
    pub fn empty(role_id: RoleId, year_id: YearId) -> Self {
        Self {
            role_id,
            year_id,
            skills: Vec::new(),
            projects: Vec::new(),
            free_resources: Vec::new(),
            paid_resources: Vec::new(),
            completion_percentage: 0.0,
            last_updated: None,
        }
    }

    #[must_use]
    pub fn track(&self, item_type: ItemType) -> &[bool] {
        match item_type {
            ItemType::Skills => &self.skills,
            ItemType::Projects => &self.projects,
            ItemType::FreeResources => &self.free_resources,
            ItemType::PaidResources => &self.paid_resources,
        }
    }
}

/// Stored state of one roadmap item after an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub item_type: ItemType,
    pub item_index: u32,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Stored state of one sub-skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSkillView {
    pub role_id: RoleId,
    pub year_id: YearId,
    pub skill_name: SkillName,
    pub sub_skill_name: SubSkillName,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One named skill with every touched sub-skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillProgressView {
    pub role_id: RoleId,
    pub year_id: YearId,
    pub skill_name: SkillName,
    pub sub_skills: BTreeMap<SubSkillName, SubSkillProgress>,
    pub overall_progress: f64,
    pub last_updated: DateTime<Utc>,
}

/// Row counts removed by a reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetView {
    pub deleted_items: u64,
    pub deleted_parents: u64,
}

/// Result of a bulk snapshot save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSaved {
    pub years: u64,
    pub items: u64,
    pub sub_skills: u64,
}

/// Rebuild a client tree from server read models.
///
/// Derived percentages are left at zero; callers run
/// `recalc::recalculate_tree` with their own catalog afterwards.
#[must_use]
pub fn assemble_tree(
    years: Vec<YearProgressView>,
    skills: Vec<SkillProgressView>,
    fallback_updated: DateTime<Utc>,
) -> ProgressTree {
    let mut tree = ProgressTree::new();

    for view in years {
        let year = YearProgress::from_tracks(
            view.skills.into_iter().collect::<ItemTrack>(),
            view.projects.into_iter().collect(),
            view.free_resources.into_iter().collect(),
            view.paid_resources.into_iter().collect(),
            view.last_updated.unwrap_or(fallback_updated),
        );
        tree.role_entry(view.role_id).insert_year(view.year_id, year);
    }

    for view in skills {
        let year = tree
            .role_entry(view.role_id)
            .year_entry(view.year_id, view.last_updated);
        year.insert_skill(view.skill_name, SkillProgress::from_sub_skills(view.sub_skills));
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn item_update_notes_are_optional() {
        let parsed: ItemUpdate = serde_json::from_str(r#"{"completed":true}"#).unwrap();
        assert_eq!(parsed.notes, None);
        let json = serde_json::to_string(&ItemUpdate {
            completed: false,
            notes: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"completed":false}"#);
    }

    #[test]
    fn assemble_merges_skills_into_years() {
        let role_id = RoleId::new("frontend").unwrap();
        let year_id = YearId::new("0-1").unwrap();
        let mut view = YearProgressView::empty(role_id.clone(), year_id.clone());
        view.skills = vec![false, true];

        let mut sub_skills = BTreeMap::new();
        sub_skills.insert(
            SubSkillName::new("grid").unwrap(),
            SubSkillProgress {
                completed: true,
                completed_at: Some(fixed_now()),
                notes: Some("layout".into()),
            },
        );
        let skill = SkillProgressView {
            role_id: role_id.clone(),
            year_id: year_id.clone(),
            skill_name: SkillName::new("css").unwrap(),
            sub_skills,
            overall_progress: 100.0,
            last_updated: fixed_now(),
        };

        let tree = assemble_tree(vec![view], vec![skill], fixed_now());
        let year = tree.year(&role_id, &year_id).unwrap();
        assert_eq!(year.track(ItemType::Skills).to_vec(), vec![false, true]);
        let css = year.skill(&SkillName::new("css").unwrap()).unwrap();
        assert_eq!(css.sub_skills().len(), 1);
        // derived values are not trusted from the wire
        assert_eq!(css.overall_progress(), 0.0);
    }
}
