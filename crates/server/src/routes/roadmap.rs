use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use progress_core::api::{
    ItemUpdate, ItemView, ResetView, SnapshotSaved, YearProgressView,
};
use progress_core::model::{ItemType, ProgressTree, RoleId, YearId, parse_item_index};

use super::body;
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// GET /roadmap-progress
pub async fn snapshot(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<YearProgressView>>, ApiError> {
    let years = state.services.roadmap().snapshot(&user_id).await?;
    Ok(Json(years))
}

/// PUT /roadmap-progress
pub async fn save_snapshot(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ProgressTree>, JsonRejection>,
) -> Result<Json<SnapshotSaved>, ApiError> {
    let tree = body(payload)?;
    let roadmap = state.services.roadmap().save_snapshot(&user_id, &tree).await?;
    let sub_skills = state.services.skills().save_snapshot(&user_id, &tree).await?;
    Ok(Json(SnapshotSaved {
        years: roadmap.years,
        items: roadmap.items,
        sub_skills,
    }))
}

/// GET /roadmap-progress/:role_id/:year_id
pub async fn year(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((role_id, year_id)): Path<(String, String)>,
) -> Result<Json<YearProgressView>, ApiError> {
    let role_id = RoleId::new(role_id)?;
    let year_id = YearId::new(year_id)?;
    let view = state
        .services
        .roadmap()
        .year(&user_id, &role_id, &year_id)
        .await?;
    Ok(Json(view))
}

/// PUT /roadmap-progress/:role_id/:year_id/:item_type/:item_index
pub async fn update_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((role_id, year_id, item_type, item_index)): Path<(String, String, String, String)>,
    payload: Result<Json<ItemUpdate>, JsonRejection>,
) -> Result<Json<ItemView>, ApiError> {
    let role_id = RoleId::new(role_id)?;
    let year_id = YearId::new(year_id)?;
    let item_type: ItemType = item_type.parse()?;
    let item_index = parse_item_index(&item_index)?;
    let update = body(payload)?;

    let item = state
        .services
        .roadmap()
        .update_item(&user_id, &role_id, &year_id, item_type, item_index, update)
        .await?;
    Ok(Json(item))
}

/// DELETE /roadmap-progress/:role_id
pub async fn reset_role(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(role_id): Path<String>,
) -> Result<Json<ResetView>, ApiError> {
    let role_id = RoleId::new(role_id)?;
    let outcome = state
        .services
        .roadmap()
        .reset_role(&user_id, &role_id)
        .await?;
    Ok(Json(outcome))
}
