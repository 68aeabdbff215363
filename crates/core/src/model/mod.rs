mod ids;
mod item;
mod progress;

pub use ids::{IdError, RoleId, SkillName, SubSkillName, UserId, YearId};
pub use item::{
    ItemTrack, ItemType, ItemTypeError, MAX_ITEM_INDEX, check_item_index, merge_notes,
    next_completed_at, parse_item_index,
};
pub use progress::{ProgressTree, RoleProgress, SkillProgress, SubSkillProgress, YearProgress};
