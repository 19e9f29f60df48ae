use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, error::AppError, utils::verify_token};

/// 校验 Bearer token，并把解出的 Claims 注入请求扩展供 handler 使用
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = auth.ok_or(AppError::Unauthorized)?;
    let claims = verify_token(bearer.token(), &state.config)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
