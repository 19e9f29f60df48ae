use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::model::{CreatePoiRequest, Poi};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::permissions::{Action, can_perform};
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub poi_id: String,
}

#[axum::debug_handler]
pub async fn create_poi(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePoiRequest>,
) -> AppResult<impl IntoResponse> {
    if !can_perform(claims.role, Action::CreatePoi, false) {
        return Err(AppError::PermissionDenied);
    }
    if req.name.is_empty() || req.name.len() > 64 {
        return Err(AppError::Validation("POI名称长度必须在1到64个字符之间".into()));
    }
    if !(-90.0..=90.0).contains(&req.latitude) || !(-180.0..=180.0).contains(&req.longitude) {
        return Err(AppError::Validation("无效的经纬度".into()));
    }

    let poi = Poi::create(&state.pool, req, &claims.sub).await?;
    Ok((StatusCode::CREATED, success_to_api_response(poi)))
}

#[axum::debug_handler]
pub async fn find_nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<impl IntoResponse> {
    let radius = query
        .radius
        .unwrap_or(1000.0)
        .min(state.config.max_search_radius);

    let pois = Poi::find_nearby(
        &state.pool,
        &state.redis,
        query.latitude,
        query.longitude,
        radius,
    )
    .await?;
    Ok((StatusCode::OK, success_to_api_response(pois)))
}

/// 删除POI：创建者可删自己的，组织者可删任何人的
#[axum::debug_handler]
pub async fn delete_poi(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IdRequest>,
) -> AppResult<impl IntoResponse> {
    let poi = Poi::find_by_id(&state.pool, &req.poi_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_owner = poi.creator_id == claims.sub;
    if !can_perform(claims.role, Action::DeletePoi, is_owner) {
        return Err(AppError::PermissionDenied);
    }

    Poi::delete(&state.pool, &req.poi_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}
