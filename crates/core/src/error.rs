use thiserror::Error;

use crate::model::{IdError, ItemTypeError};

/// Validation failures raised while building domain values from raw input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    ItemType(#[from] ItemTypeError),
    #[error("invalid item index: {0}")]
    ItemIndex(String),
}
