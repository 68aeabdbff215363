use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when an identifier fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} cannot contain '/'")]
    Separator { kind: &'static str },
}

fn validate(kind: &'static str, raw: String) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if trimmed.contains('/') {
        return Err(IdError::Separator { kind });
    }
    if trimmed.len() == raw.len() {
        Ok(raw)
    } else {
        Ok(trimmed.to_string())
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier (trimmed, non-empty, no `/`).
            ///
            /// # Errors
            ///
            /// Returns `IdError` if the value is empty after trimming or
            /// contains a path separator.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                validate($kind, value.into()).map(Self)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Account that owns a progress tree. Issued by the external session provider.
    UserId,
    "user id"
);
string_id!(
    /// Career roadmap role, e.g. `frontend`.
    RoleId,
    "role id"
);
string_id!(
    /// Experience band within a role, e.g. `0-1`.
    YearId,
    "year id"
);
string_id!(
    /// Named skill tracked within a year.
    SkillName,
    "skill name"
);
string_id!(
    /// Sub-skill of a named skill.
    SubSkillName,
    "sub-skill name"
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_id_trims_whitespace() {
        let id = RoleId::new("  frontend ").unwrap();
        assert_eq!(id.as_str(), "frontend");
        assert_eq!(id.to_string(), "frontend");
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert_eq!(
            YearId::new("   ").unwrap_err(),
            IdError::Empty { kind: "year id" }
        );
        assert!("".parse::<UserId>().is_err());
    }

    #[test]
    fn separators_are_rejected() {
        let err = SkillName::new("a/b").unwrap_err();
        assert!(matches!(err, IdError::Separator { .. }));
    }

    #[test]
    fn debug_names_the_kind() {
        let id = UserId::new("u1").unwrap();
        assert_eq!(format!("{id:?}"), "UserId(\"u1\")");
    }

    #[test]
    fn deserialization_validates() {
        let ok: RoleId = serde_json::from_str("\"backend\"").unwrap();
        assert_eq!(ok.as_str(), "backend");
        assert!(serde_json::from_str::<RoleId>("\"\"").is_err());
    }
}
