use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

//
// ─── ITEM TYPE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown item type: {0}")]
pub struct ItemTypeError(pub String);

/// One of the four trackable categories of a roadmap year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Skills,
    Projects,
    FreeResources,
    PaidResources,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [
        ItemType::Skills,
        ItemType::Projects,
        ItemType::FreeResources,
        ItemType::PaidResources,
    ];

    /// Wire and storage name (`skills`, `projects`, `freeResources`, `paidResources`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Skills => "skills",
            ItemType::Projects => "projects",
            ItemType::FreeResources => "freeResources",
            ItemType::PaidResources => "paidResources",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ItemTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skills" => Ok(ItemType::Skills),
            "projects" => Ok(ItemType::Projects),
            "freeResources" => Ok(ItemType::FreeResources),
            "paidResources" => Ok(ItemType::PaidResources),
            other => Err(ItemTypeError(other.to_string())),
        }
    }
}

//
// ─── ITEM TRACK ────────────────────────────────────────────────────────────────
//

/// Completion flags for one category, indexed by catalog position.
///
/// Stored sparsely: any index that was never touched reads as `false`. The
/// logical length is the highest touched index plus one, which is also the
/// length of the dense array it serializes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemTrack {
    entries: BTreeMap<u32, bool>,
}

impl ItemTrack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, index: u32) -> bool {
        self.entries.get(&index).copied().unwrap_or(false)
    }

    /// Sets the flag at `index`, extending the logical length if needed.
    pub fn set(&mut self, index: u32, completed: bool) {
        self.entries.insert(index, completed);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .last_key_value()
            .map_or(0, |(index, _)| *index as usize + 1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.entries.values().filter(|done| **done).count() as u64
    }

    /// Dense view padded with `false` up to the highest touched index.
    #[must_use]
    pub fn to_vec(&self) -> Vec<bool> {
        let Some((last, _)) = self.entries.last_key_value() else {
            return Vec::new();
        };
        (0..=*last).map(|i| self.get(i)).collect()
    }

    /// Explicitly touched `(index, completed)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.entries.iter().map(|(index, done)| (*index, *done))
    }
}

/// Rebuild from a dense array. Only `true` positions and the last position
/// count as touched; padding `false` values stay untracked.
impl FromIterator<bool> for ItemTrack {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut entries = BTreeMap::new();
        let mut last = None;
        for (index, completed) in (0u32..).zip(iter) {
            if completed {
                entries.insert(index, true);
            }
            last = Some(index);
        }
        if let Some(last) = last {
            entries.entry(last).or_insert(false);
        }
        Self { entries }
    }
}

impl FromIterator<(u32, bool)> for ItemTrack {
    fn from_iter<I: IntoIterator<Item = (u32, bool)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for ItemTrack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ItemTrack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dense = Vec::<bool>::deserialize(deserializer)?;
        Ok(dense.into_iter().collect())
    }
}

/// Highest accepted item index. Tracks serialize densely up to this bound.
pub const MAX_ITEM_INDEX: u32 = 9_999;

/// Parse a path-supplied item index: a non-negative integer not above
/// `MAX_ITEM_INDEX`.
///
/// # Errors
///
/// Returns `Error::ItemIndex` for negative, non-numeric or out-of-range input.
pub fn parse_item_index(raw: &str) -> Result<u32, crate::Error> {
    let index: u32 = raw
        .trim()
        .parse()
        .map_err(|_| crate::Error::ItemIndex(raw.to_string()))?;
    check_item_index(index)
}

/// # Errors
///
/// Returns `Error::ItemIndex` when `index` exceeds `MAX_ITEM_INDEX`.
pub fn check_item_index(index: u32) -> Result<u32, crate::Error> {
    if index > MAX_ITEM_INDEX {
        return Err(crate::Error::ItemIndex(index.to_string()));
    }
    Ok(index)
}

//
// ─── COMPLETION TRANSITIONS ────────────────────────────────────────────────────
//

/// `completedAt` after a write: kept when already complete, stamped on the
/// transition to complete, cleared on un-completion.
#[must_use]
pub fn next_completed_at(
    previous: Option<DateTime<Utc>>,
    completed: bool,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if completed {
        Some(previous.unwrap_or(now))
    } else {
        None
    }
}

/// A write without notes keeps the stored notes.
#[must_use]
pub fn merge_notes(previous: Option<String>, incoming: Option<String>) -> Option<String> {
    incoming.or(previous)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
