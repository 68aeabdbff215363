//! Derived percentages.
//!
//! Every percentage in the progress tree is a function of raw flags and
//! catalog counts. Values read from storage or the network are overwritten by
//! these functions before anyone looks at them.

use crate::catalog::{Catalog, CatalogCounts};
use crate::model::{ProgressTree, RoleProgress, SkillProgress, YearProgress};

/// `100 * completed / total`, clamped to `[0, 100]`; `0` when `total` is `0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn completion_from_totals(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = completed as f64 * 100.0 / total as f64;
    pct.clamp(0.0, 100.0)
}

/// Completed entries across the four tracks over the catalog total.
///
/// The denominator comes from the catalog, never from track length.
#[must_use]
pub fn year_completion(year: &YearProgress, counts: CatalogCounts) -> f64 {
    completion_from_totals(year.completed_items(), counts.total())
}

/// Mean of the years' completion, each year weighted equally.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn role_overall(role: &RoleProgress) -> f64 {
    let years = role.years();
    if years.is_empty() {
        return 0.0;
    }
    let sum: f64 = years.values().map(YearProgress::completion_percentage).sum();
    sum / years.len() as f64
}

/// Completed sub-skills over sub-skills ever touched.
#[must_use]
pub fn skill_overall(skill: &SkillProgress) -> f64 {
    let touched = skill.sub_skills().len() as u64;
    let completed = skill.sub_skills().values().filter(|s| s.completed).count() as u64;
    completion_from_totals(completed, touched)
}

/// Refresh the year's skills and completion percentage in place.
pub fn recalculate_year(year: &mut YearProgress, counts: CatalogCounts) {
    for skill in year.skill_progress_mut() {
        let overall = skill_overall(skill);
        skill.set_overall_progress(overall);
    }
    let pct = year_completion(year, counts);
    year.set_completion_percentage(pct);
}

/// Refresh every year of the role, then the role's overall progress.
pub fn recalculate_role(role: &mut RoleProgress, catalog: &dyn Catalog) {
    let role_id = role.role_id().clone();
    for (year_id, year) in role.years_mut() {
        recalculate_year(year, catalog.counts(&role_id, year_id));
    }
    let overall = role_overall(role);
    role.set_overall_progress(overall);
}

/// Refresh every derived value in the tree.
pub fn recalculate_tree(tree: &mut ProgressTree, catalog: &dyn Catalog) {
    for role in tree.roles_mut() {
        recalculate_role(role, catalog);
    }
}
