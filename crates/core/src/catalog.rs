//! Canonical catalog contract.
//!
//! The roadmap content itself lives elsewhere; progress only needs to know how
//! many trackable items each (role, year) has per category.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{ItemType, RoleId, YearId};

/// Fixed item counts for one (role, year).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCounts {
    pub skills: u32,
    pub projects: u32,
    pub free_resources: u32,
    pub paid_resources: u32,
}

impl CatalogCounts {
    #[must_use]
    pub fn new(skills: u32, projects: u32, free_resources: u32, paid_resources: u32) -> Self {
        Self {
            skills,
            projects,
            free_resources,
            paid_resources,
        }
    }

    #[must_use]
    pub fn get(&self, item_type: ItemType) -> u32 {
        match item_type {
            ItemType::Skills => self.skills,
            ItemType::Projects => self.projects,
            ItemType::FreeResources => self.free_resources,
            ItemType::PaidResources => self.paid_resources,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        ItemType::ALL.iter().map(|t| u64::from(self.get(*t))).sum()
    }
}

/// Read-only source of catalog counts.
///
/// Implementations must return all-zero counts for an unknown (role, year).
pub trait Catalog: Send + Sync {
    fn counts(&self, role_id: &RoleId, year_id: &YearId) -> CatalogCounts;
}

/// In-memory catalog, typically built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<(RoleId, YearId), CatalogCounts>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, role_id: RoleId, year_id: YearId, counts: CatalogCounts) -> Self {
        self.insert(role_id, year_id, counts);
        self
    }

    pub fn insert(&mut self, role_id: RoleId, year_id: YearId, counts: CatalogCounts) {
        self.entries.insert((role_id, year_id), counts);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn counts(&self, role_id: &RoleId, year_id: &YearId) -> CatalogCounts {
        self.entries
            .get(&(role_id.clone(), year_id.clone()))
            .copied()
            .unwrap_or_default()
    }
}

impl FromIterator<(RoleId, YearId, CatalogCounts)> for StaticCatalog {
    fn from_iter<I: IntoIterator<Item = (RoleId, YearId, CatalogCounts)>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for (role_id, year_id, counts) in iter {
            catalog.insert(role_id, year_id, counts);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_year_is_all_zero() {
        let catalog = StaticCatalog::new().with_entry(
            RoleId::new("frontend").unwrap(),
            YearId::new("0-1").unwrap(),
            CatalogCounts::new(5, 2, 3, 1),
        );

        let known = catalog.counts(&RoleId::new("frontend").unwrap(), &YearId::new("0-1").unwrap());
        assert_eq!(known.total(), 11);
        assert_eq!(known.get(ItemType::FreeResources), 3);

        let unknown = catalog.counts(&RoleId::new("backend").unwrap(), &YearId::new("0-1").unwrap());
        assert_eq!(unknown, CatalogCounts::default());
        assert_eq!(unknown.total(), 0);
    }
}
