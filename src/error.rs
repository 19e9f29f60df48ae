use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::utils::{error_codes, error_to_api_response};

/// 业务层统一错误类型，所有 handler 以 `AppResult` 返回
#[derive(Debug, Error)]
pub enum AppError {
    #[error("resource not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    /// 目标状态已经成立（如重复加入群组）。调用方可视为成功。
    #[error("already in the requested state")]
    AlreadyInState,

    #[error("unauthorized")]
    Unauthorized,

    #[error("user already exists")]
    UserExists,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited")]
    RateLimited,

    /// 后端瞬时故障（数据库/缓存/推送网关），不在本层重试
    #[error("transient backend failure: {0}")]
    TransientIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::AlreadyInState,
            other => AppError::TransientIo(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::TransientIo(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::TransientIo(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::AlreadyInState => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::UserExists => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::NotFound => error_codes::NOT_FOUND,
            AppError::PermissionDenied => error_codes::PERMISSION_DENIED,
            AppError::AlreadyInState => error_codes::ALREADY_IN_STATE,
            AppError::Unauthorized => error_codes::AUTH_FAILED,
            AppError::UserExists => error_codes::USER_EXISTS,
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::RateLimited => error_codes::RATE_LIMIT,
            AppError::TransientIo(_) => error_codes::TRANSIENT_IO,
            AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match self {
            AppError::NotFound => "资源不存在".into(),
            AppError::PermissionDenied => "没有权限执行该操作".into(),
            AppError::AlreadyInState => "目标状态已成立".into(),
            AppError::Unauthorized => "未授权访问".into(),
            AppError::UserExists => "用户已存在".into(),
            AppError::Validation(msg) => msg.clone(),
            AppError::RateLimited => "请求过于频繁".into(),
            AppError::TransientIo(_) => "后端暂时不可用，请稍后重试".into(),
            AppError::Internal(_) => "内部服务器错误".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::TransientIo(detail) | AppError::Internal(detail) = &self {
            tracing::error!("request failed: {}", detail);
        }
        let body = error_to_api_response::<()>(self.code(), self.user_message());
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_row_not_found_maps_to_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn transient_errors_carry_transient_code() {
        let err = AppError::TransientIo("connection reset".into());
        assert_eq!(err.code(), error_codes::TRANSIENT_IO);
    }

    #[test]
    fn every_variant_has_a_distinct_status_class() {
        // 故障必须显式分类，任何变体都不允许落回 200
        let all = [
            AppError::NotFound,
            AppError::PermissionDenied,
            AppError::AlreadyInState,
            AppError::Unauthorized,
            AppError::UserExists,
            AppError::Validation("x".into()),
            AppError::RateLimited,
            AppError::TransientIo("x".into()),
            AppError::Internal("x".into()),
        ];
        for e in all {
            assert!(e.status().as_u16() >= 400);
        }
    }
}
