use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{CreateEmergencyRequest, Emergency, ResolveEmergencyRequest};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::permissions::{Action, can_perform};
use crate::utils::{Claims, success_to_api_response};

#[axum::debug_handler]
pub async fn create_emergency(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEmergencyRequest>,
) -> AppResult<impl IntoResponse> {
    if !can_perform(claims.role, Action::CreateEmergency, false) {
        return Err(AppError::PermissionDenied);
    }
    if !(-90.0..=90.0).contains(&req.latitude) || !(-180.0..=180.0).contains(&req.longitude) {
        return Err(AppError::Validation("无效的经纬度".into()));
    }

    let emergency = Emergency::create(&state.pool, req, &claims.sub).await?;

    // 推送是尽力而为的旁路：失败只记日志，不影响告警本身落库
    if let Some(webhook) = state.config.push_webhook_url.clone() {
        let http = state.http.clone();
        let payload = serde_json::json!({
            "emergency_id": emergency.emergency_id,
            "kind": emergency.kind,
            "latitude": emergency.latitude,
            "longitude": emergency.longitude,
            "created_at": emergency.created_at,
        });
        tokio::spawn(async move {
            if let Err(e) = http.post(webhook.as_str()).json(&payload).send().await {
                tracing::warn!("emergency push dispatch failed: {}", e);
            }
        });
    }

    Ok((StatusCode::CREATED, success_to_api_response(emergency)))
}

#[axum::debug_handler]
pub async fn resolve_emergency(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResolveEmergencyRequest>,
) -> AppResult<impl IntoResponse> {
    if !can_perform(claims.role, Action::ResolveEmergency, false) {
        return Err(AppError::PermissionDenied);
    }

    let emergency = Emergency::resolve(&state.pool, &req.emergency_id, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(emergency)))
}

#[axum::debug_handler]
pub async fn list_active(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let emergencies = Emergency::list_active(&state.pool).await?;
    Ok((StatusCode::OK, success_to_api_response(emergencies)))
}
