use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};
use crate::permissions::Role;
use crate::utils::{hash_password, verify_password};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub nickname: String,
    pub role: String,
    pub is_temporary: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub group_ref: Option<String>,
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRegisteredUserRequest {
    pub user_id: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user_id: String,
    pub nickname: String,
    pub role: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub role: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNicknameRequest {
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CheckTokenResponse {
    pub user_id: String,
    pub role: String,
    pub is_temporary: bool,
}

const USER_COLUMNS: &str =
    "user_id, nickname, role, is_temporary, password_hash, group_ref, online, last_seen_at";

impl User {
    /// 账户角色。存量数据里的未知标签按最低权限处理。
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Attendee)
    }

    pub async fn create(pool: &PgPool, req: CreateRegisteredUserRequest) -> AppResult<Self> {
        let password_hash = hash_password(&req.password)?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (user_id, nickname, role, is_temporary, password_hash,
                               online, last_seen_at)
            VALUES ($1, $2, 'attendee', FALSE, $3, TRUE, NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&req.user_id)
        .bind(&req.nickname)
        .bind(&password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::UserExists,
            other => other.into(),
        })?;

        Ok(user)
    }

    pub async fn create_temporary(
        pool: &PgPool,
        user_id: &str,
        nickname: &str,
    ) -> AppResult<Self> {
        tracing::debug!("Creating temporary user: {}", user_id);

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (user_id, nickname, role, is_temporary, online, last_seen_at)
            VALUES ($1, $2, 'attendee', TRUE, TRUE, NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(nickname)
        .fetch_one(pool)
        .await?;

        tracing::info!("Created temporary user: {}", user.user_id);
        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> AppResult<Option<Self>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub fn verify_login(&self, password: &str) -> AppResult<bool> {
        match &self.password_hash {
            Some(hash) => Ok(verify_password(password, hash)?),
            None => Ok(false),
        }
    }

    pub async fn update_nickname(
        pool: &PgPool,
        user_id: &str,
        nickname: &str,
    ) -> AppResult<Self> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET nickname = $1
            WHERE user_id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(nickname)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// 在线心跳：刷新最后活跃时间并置在线标记。用户记录永不硬删，
    /// 这里只动软字段。
    pub async fn heartbeat(pool: &PgPool, user_id: &str) -> AppResult<DateTime<Utc>> {
        let last_seen: DateTime<Utc> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET last_seen_at = NOW(), online = TRUE
            WHERE user_id = $1
            RETURNING last_seen_at
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(last_seen)
    }

    pub async fn set_role(pool: &PgPool, user_id: &str, role: Role) -> AppResult<Self> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET role = $1
            WHERE user_id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(role.as_str())
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }
}
