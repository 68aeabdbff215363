use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use progress_core::api::{ItemUpdate, ResetView, SkillProgressView, SubSkillView};
use progress_core::model::{RoleId, SkillName, SubSkillName, YearId};
use services::skill_key;

use super::body;
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

type SubSkillPath = (String, String, String, String, String);

/// GET /progress/:user_id
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path_user): Path<String>,
) -> Result<Json<Vec<SkillProgressView>>, ApiError> {
    user.ensure_owner(&path_user)?;
    let skills = state.services.skills().list(&user.0).await?;
    Ok(Json(skills))
}

/// GET /progress/:user_id/:role_id/:year_id
pub async fn list_year(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_user, role_id, year_id)): Path<(String, String, String)>,
) -> Result<Json<Vec<SkillProgressView>>, ApiError> {
    user.ensure_owner(&path_user)?;
    let role_id = RoleId::new(role_id)?;
    let year_id = YearId::new(year_id)?;
    let skills = state
        .services
        .skills()
        .list_year(&user.0, &role_id, &year_id)
        .await?;
    Ok(Json(skills))
}

/// PUT /progress/:user_id/:role_id/:year_id/:skill_name/:sub_skill_name
pub async fn update_sub_skill(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_user, role_id, year_id, skill, sub_skill)): Path<SubSkillPath>,
    payload: Result<Json<ItemUpdate>, JsonRejection>,
) -> Result<Json<SubSkillView>, ApiError> {
    user.ensure_owner(&path_user)?;
    let key = skill_key(
        &user.0,
        &RoleId::new(role_id)?,
        &YearId::new(year_id)?,
        &SkillName::new(skill)?,
    );
    let sub_skill = SubSkillName::new(sub_skill)?;
    let update = body(payload)?;

    let view = state
        .services
        .skills()
        .update_sub_skill(&key, &sub_skill, update)
        .await?;
    Ok(Json(view))
}

/// GET /progress/:user_id/:role_id/:year_id/:skill_name/:sub_skill_name
pub async fn sub_skill(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_user, role_id, year_id, skill, sub_skill)): Path<SubSkillPath>,
) -> Result<Json<SubSkillView>, ApiError> {
    user.ensure_owner(&path_user)?;
    let key = skill_key(
        &user.0,
        &RoleId::new(role_id)?,
        &YearId::new(year_id)?,
        &SkillName::new(skill)?,
    );
    let sub_skill = SubSkillName::new(sub_skill)?;

    let view = state.services.skills().sub_skill(&key, &sub_skill).await?;
    Ok(Json(view))
}

/// DELETE /progress/:user_id/:role_id
pub async fn reset_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_user, role_id)): Path<(String, String)>,
) -> Result<Json<ResetView>, ApiError> {
    user.ensure_owner(&path_user)?;
    let role_id = RoleId::new(role_id)?;
    let outcome = state
        .services
        .skills()
        .reset_role(&user.0, &role_id)
        .await?;
    Ok(Json(outcome))
}
