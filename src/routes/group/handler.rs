use axum::{
    Extension,
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::permissions::Role;
use crate::utils::{Claims, success_to_api_response};

use super::lifecycle::{self, CleanupAction};
use super::model::{CreateGroupRequest, Group, GroupInfo};

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinGroupRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct KickMemberRequest {
    pub group_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct JoinGroupResponse {
    pub group_id: String,
    pub already_member: bool,
}

#[derive(Debug, Serialize)]
pub struct LeaveGroupResponse {
    pub group_deleted: bool,
}

/// 会话启动时调用：解析（必要时派生/迁移）用户归属的群组
#[axum::debug_handler]
pub async fn resolve_session_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let outcome = lifecycle::resolve_group(&state.pool, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(outcome)))
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<impl IntoResponse> {
    if req.name.len() < 2 || req.name.len() > 48 {
        return Err(AppError::Validation("群组名称长度必须在2到48个字符之间".into()));
    }

    let group = lifecycle::create_group(&state.pool, &req.name, &claims.sub).await?;
    Ok((
        StatusCode::CREATED,
        success_to_api_response(GroupInfo::from(group)),
    ))
}

#[axum::debug_handler]
pub async fn find_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> AppResult<impl IntoResponse> {
    let group = Group::find_by_id(&state.pool, &state.redis, &query.group_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok((StatusCode::OK, success_to_api_response(GroupInfo::from(group))))
}

/// 凭加入码入组。已在组内视为成功（幂等）。
#[axum::debug_handler]
pub async fn join_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinGroupRequest>,
) -> AppResult<impl IntoResponse> {
    let code = req.code.trim().to_uppercase();
    match lifecycle::join_group(&state.pool, &state.redis, &claims.sub, &code).await {
        Ok(group) => Ok((
            StatusCode::OK,
            success_to_api_response(JoinGroupResponse {
                group_id: group.group_id,
                already_member: false,
            }),
        )),
        Err(AppError::AlreadyInState) => {
            let group = Group::find_by_join_code(&state.pool, &code)
                .await?
                .ok_or(AppError::NotFound)?;
            Ok((
                StatusCode::OK,
                success_to_api_response(JoinGroupResponse {
                    group_id: group.group_id,
                    already_member: true,
                }),
            ))
        }
        Err(e) => Err(e),
    }
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IdQuery>,
) -> AppResult<impl IntoResponse> {
    let outcome =
        lifecycle::leave_group(&state.pool, &state.redis, &claims.sub, &req.group_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(LeaveGroupResponse {
            group_deleted: outcome == CleanupAction::Delete,
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IdQuery>,
) -> AppResult<impl IntoResponse> {
    lifecycle::delete_group(&state.pool, &state.redis, &req.group_id, &claims).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}

/// 成员列表只对组内成员和组织者可见
#[axum::debug_handler]
pub async fn get_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<IdQuery>,
) -> AppResult<impl IntoResponse> {
    let visible = claims.role == Role::Organizer
        || Group::is_member(&state.pool, &query.group_id, &claims.sub).await?;
    if !visible {
        return Err(AppError::PermissionDenied);
    }

    let members = Group::members(&state.pool, &query.group_id).await?;
    Ok((StatusCode::OK, success_to_api_response(members)))
}

#[axum::debug_handler]
pub async fn kick_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<KickMemberRequest>,
) -> AppResult<impl IntoResponse> {
    lifecycle::kick_member(&state.pool, &state.redis, &req.group_id, &req.user_id, &claims)
        .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}
