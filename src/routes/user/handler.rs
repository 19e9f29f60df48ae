use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    permissions::{Action, Role, can_perform},
    utils::{Claims, generate_temp_token, generate_token, success_to_api_response},
};

use super::model::{
    CheckTokenResponse, CreateRegisteredUserRequest, CreateUserResponse, HeartbeatResponse,
    LoginRequest, LoginResponse, RefreshTokenResponse, SetRoleRequest, UpdateNicknameRequest,
    User,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CreateRegisteredUserRequest>,
) -> AppResult<impl IntoResponse> {
    // 检查用户ID格式
    if req.user_id.is_empty()
        || !req.user_id.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return Err(AppError::Validation(
            "用户ID格式无效，只允许使用字母、数字和下划线".into(),
        ));
    }
    if req.password.len() < 6 || req.password.len() > 24 {
        return Err(AppError::Validation("密码长度必须在6到24个字符之间".into()));
    }

    let user = User::create(&state.pool, req).await?;
    let token = generate_token(&user.user_id, user.role(), &state.config)
        .map_err(|_| AppError::Internal("failed to issue token".into()))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(CreateUserResponse {
            user_id: user.user_id,
            nickname: user.nickname,
            role: user.role,
            token,
        }),
    ))
}

#[axum::debug_handler]
pub async fn create_temporary(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    // 生成随机用户ID和昵称
    let user_id = uuid::Uuid::new_v4().to_string();
    let nickname = format!("用户{}", &user_id[0..6]);

    let user = User::create_temporary(&state.pool, &user_id, &nickname).await?;
    let token = generate_temp_token(&user.user_id, &state.config)
        .map_err(|_| AppError::Internal("failed to issue temp token".into()))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(CreateUserResponse {
            user_id: user.user_id,
            nickname: user.nickname,
            role: user.role,
            token,
        }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = User::find_by_id(&state.pool, &req.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // 临时用户没有密码，不能走登录
    if user.is_temporary {
        return Err(AppError::Unauthorized);
    }

    if !user.verify_login(&req.password)? {
        return Err(AppError::Unauthorized);
    }

    let token = generate_token(&user.user_id, user.role(), &state.config)
        .map_err(|_| AppError::Internal("failed to issue token".into()))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(LoginResponse {
            user_id: user.user_id,
            role: user.role,
            token,
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_nickname(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdateNicknameRequest>,
) -> AppResult<impl IntoResponse> {
    // 验证昵称长度
    if req.nickname.len() < 2 || req.nickname.len() > 24 {
        return Err(AppError::Validation("昵称长度必须在2到24个字符之间".into()));
    }

    let user = User::update_nickname(&state.pool, &claims.sub, &req.nickname).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn heartbeat(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let last_seen_at = User::heartbeat(&state.pool, &claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(HeartbeatResponse { last_seen_at }),
    ))
}

/// 组织者调整他人角色。角色变化在下一次签发token时生效。
#[axum::debug_handler]
pub async fn set_role(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<SetRoleRequest>,
) -> AppResult<impl IntoResponse> {
    if !can_perform(claims.role, Action::ManageRoles, false) {
        return Err(AppError::PermissionDenied);
    }

    let role = Role::parse(&req.role)
        .ok_or_else(|| AppError::Validation(format!("未知角色: {}", req.role)))?;

    let user = User::set_role(&state.pool, &req.user_id, role).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn refresh_token(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    // 根据用户类型使用对应的token生成函数
    let token = if claims.is_temp {
        generate_temp_token(&claims.sub, &state.config)
    } else {
        generate_token(&claims.sub, claims.role, &state.config)
    }
    .map_err(|_| AppError::Internal("failed to issue token".into()))?;

    Ok((
        StatusCode::OK,
        success_to_api_response(RefreshTokenResponse { token }),
    ))
}

/// 检查token是否有效，如果有效返回成功，否则返回失败
#[axum::debug_handler]
pub async fn check_token(Extension(claims): Extension<Claims>) -> AppResult<impl IntoResponse> {
    // 认证中间件已验证token有效，所以直接返回成功
    Ok((
        StatusCode::OK,
        success_to_api_response(CheckTokenResponse {
            user_id: claims.sub,
            role: claims.role.as_str().to_string(),
            is_temporary: claims.is_temp,
        }),
    ))
}
