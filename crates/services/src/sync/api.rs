use std::fmt;

use async_trait::async_trait;
use progress_core::api::{
    ItemUpdate, ItemView, ResetView, SkillProgressView, SnapshotSaved, SubSkillView,
    YearProgressView,
};
use progress_core::model::{ItemType, ProgressTree, RoleId, SkillName, SubSkillName, UserId, YearId};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::config::SyncConfig;
use super::error::SyncError;

/// Authenticated user on whose behalf the client talks to the server.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub token: String,
}

impl Session {
    #[must_use]
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Remote progress endpoints used by the sync engine.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    async fn fetch_snapshot(&self, session: &Session) -> Result<Vec<YearProgressView>, SyncError>;

    async fn fetch_skills(&self, session: &Session) -> Result<Vec<SkillProgressView>, SyncError>;

    async fn fetch_year(
        &self,
        session: &Session,
        role_id: &RoleId,
        year_id: &YearId,
    ) -> Result<YearProgressView, SyncError>;

    async fn put_item(
        &self,
        session: &Session,
        role_id: &RoleId,
        year_id: &YearId,
        item_type: ItemType,
        item_index: u32,
        update: &ItemUpdate,
    ) -> Result<ItemView, SyncError>;

    async fn put_sub_skill(
        &self,
        session: &Session,
        role_id: &RoleId,
        year_id: &YearId,
        skill: &SkillName,
        sub_skill: &SubSkillName,
        update: &ItemUpdate,
    ) -> Result<SubSkillView, SyncError>;

    async fn save_snapshot(
        &self,
        session: &Session,
        tree: &ProgressTree,
    ) -> Result<SnapshotSaved, SyncError>;

    async fn delete_role(&self, session: &Session, role_id: &RoleId) -> Result<ResetView, SyncError>;

    async fn delete_skill_role(
        &self,
        session: &Session,
        role_id: &RoleId,
    ) -> Result<ResetView, SyncError>;
}

/// `ProgressApi` over HTTP with bearer authentication.
#[derive(Clone, Debug)]
pub struct HttpProgressApi {
    client: Client,
    base_url: Url,
}

impl HttpProgressApi {
    /// # Errors
    ///
    /// Returns `SyncError::Config` for invalid settings and `SyncError::Http`
    /// if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let base_url = config.validate()?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config("api_base_url cannot be a base".into()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with each segment appended percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Status(status));
    }
    Ok(response.json().await?)
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    async fn fetch_snapshot(&self, session: &Session) -> Result<Vec<YearProgressView>, SyncError> {
        let response = self
            .client
            .get(self.endpoint(&["roadmap-progress"]))
            .bearer_auth(&session.token)
            .send()
            .await?;
        decode(response).await
    }

    async fn fetch_skills(&self, session: &Session) -> Result<Vec<SkillProgressView>, SyncError> {
        let response = self
            .client
            .get(self.endpoint(&["progress", session.user_id.as_str()]))
            .bearer_auth(&session.token)
            .send()
            .await?;
        decode(response).await
    }

    async fn fetch_year(
        &self,
        session: &Session,
        role_id: &RoleId,
        year_id: &YearId,
    ) -> Result<YearProgressView, SyncError> {
        let response = self
            .client
            .get(self.endpoint(&["roadmap-progress", role_id.as_str(), year_id.as_str()]))
            .bearer_auth(&session.token)
            .send()
            .await?;
        decode(response).await
    }

    async fn put_item(
        &self,
        session: &Session,
        role_id: &RoleId,
        year_id: &YearId,
        item_type: ItemType,
        item_index: u32,
        update: &ItemUpdate,
    ) -> Result<ItemView, SyncError> {
        let index = item_index.to_string();
        let url = self.endpoint(&[
            "roadmap-progress",
            role_id.as_str(),
            year_id.as_str(),
            item_type.as_str(),
            &index,
        ]);
        let response = self
            .client
            .put(url)
            .bearer_auth(&session.token)
            .json(update)
            .send()
            .await?;
        decode(response).await
    }

    async fn put_sub_skill(
        &self,
        session: &Session,
        role_id: &RoleId,
        year_id: &YearId,
        skill: &SkillName,
        sub_skill: &SubSkillName,
        update: &ItemUpdate,
    ) -> Result<SubSkillView, SyncError> {
        let url = self.endpoint(&[
            "progress",
            session.user_id.as_str(),
            role_id.as_str(),
            year_id.as_str(),
            skill.as_str(),
            sub_skill.as_str(),
        ]);
        let response = self
            .client
            .put(url)
            .bearer_auth(&session.token)
            .json(update)
            .send()
            .await?;
        decode(response).await
    }

    async fn save_snapshot(
        &self,
        session: &Session,
        tree: &ProgressTree,
    ) -> Result<SnapshotSaved, SyncError> {
        let response = self
            .client
            .put(self.endpoint(&["roadmap-progress"]))
            .bearer_auth(&session.token)
            .json(tree)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_role(&self, session: &Session, role_id: &RoleId) -> Result<ResetView, SyncError> {
        let response = self
            .client
            .delete(self.endpoint(&["roadmap-progress", role_id.as_str()]))
            .bearer_auth(&session.token)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_skill_role(
        &self,
        session: &Session,
        role_id: &RoleId,
    ) -> Result<ResetView, SyncError> {
        let response = self
            .client
            .delete(self.endpoint(&["progress", session.user_id.as_str(), role_id.as_str()]))
            .bearer_auth(&session.token)
            .send()
            .await?;
        decode(response).await
    }
}
