use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::model::{MemberLocation, UpdateLocationRequest};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::permissions::{Action, can_perform};
use crate::routes::group::Group;
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteLocationRequest {
    pub group_id: String,
    pub user_id: String,
}

#[axum::debug_handler]
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateLocationRequest>,
) -> AppResult<impl IntoResponse> {
    if !(-90.0..=90.0).contains(&req.latitude) || !(-180.0..=180.0).contains(&req.longitude) {
        return Err(AppError::Validation("无效的经纬度".into()));
    }

    MemberLocation::upsert(&state.pool, &req, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}

#[axum::debug_handler]
pub async fn get_group_locations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<GroupQuery>,
) -> AppResult<impl IntoResponse> {
    if !Group::is_member(&state.pool, &query.group_id, &claims.sub).await? {
        return Err(AppError::PermissionDenied);
    }

    let locations = MemberLocation::list_group(&state.pool, &query.group_id).await?;
    Ok((StatusCode::OK, success_to_api_response(locations)))
}

/// 清掉地图上的位置标记。本人随时可清自己的；
/// 清别人的标记需要整图管理权限。
#[axum::debug_handler]
pub async fn delete_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteLocationRequest>,
) -> AppResult<impl IntoResponse> {
    if req.user_id != claims.sub && !can_perform(claims.role, Action::DeleteAnyMarker, false) {
        return Err(AppError::PermissionDenied);
    }

    MemberLocation::delete(&state.pool, &req.group_id, &req.user_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}
