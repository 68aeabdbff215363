use std::collections::HashMap;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use progress_core::model::UserId;

use crate::AppState;
use crate::error::ApiError;

/// Resolves bearer tokens to users.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, UserId>,
}

impl StaticTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, UserId)> for StaticTokens {
    fn from_iter<I: IntoIterator<Item = (String, UserId)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).cloned()
    }
}

/// The authenticated user of a request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl AuthUser {
    /// Reject requests addressing another user's data.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` when `path_user` differs from this user.
    pub fn ensure_owner(&self, path_user: &str) -> Result<(), ApiError> {
        if self.0.as_str() == path_user.trim() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        state
            .auth
            .authenticate(token)
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tokens_do_not_authenticate() {
        let tokens = StaticTokens::new().with_token("t1", UserId::new("u1").unwrap());
        assert_eq!(tokens.authenticate("t1").unwrap().as_str(), "u1");
        assert!(tokens.authenticate("t2").is_none());
    }

    #[test]
    fn owner_check_compares_path_user() {
        let user = AuthUser(UserId::new("u1").unwrap());
        assert!(user.ensure_owner("u1").is_ok());
        assert!(matches!(user.ensure_owner("u2"), Err(ApiError::Forbidden)));
    }
}
