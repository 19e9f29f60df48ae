use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Emergency {
    pub emergency_id: String,
    pub user_id: String,
    pub group_id: Option<String>,
    pub kind: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmergencyRequest {
    pub kind: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveEmergencyRequest {
    pub emergency_id: String,
}

const EMERGENCY_COLUMNS: &str = "emergency_id, user_id, group_id, kind, description, \
     latitude, longitude, status, created_at, resolved_at, resolved_by";

impl Emergency {
    pub async fn create(
        pool: &PgPool,
        req: CreateEmergencyRequest,
        user_id: &str,
    ) -> AppResult<Self> {
        let emergency_id = Uuid::new_v4().to_string();

        let emergency = sqlx::query_as::<_, Emergency>(&format!(
            r#"
            INSERT INTO emergencies (emergency_id, user_id, group_id, kind, description,
                                     latitude, longitude, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', NOW())
            RETURNING {EMERGENCY_COLUMNS}
            "#
        ))
        .bind(&emergency_id)
        .bind(user_id)
        .bind(&req.group_id)
        .bind(&req.kind)
        .bind(&req.description)
        .bind(req.latitude)
        .bind(req.longitude)
        .fetch_one(pool)
        .await?;

        Ok(emergency)
    }

    /// 处置告警。重复处置返回 `AlreadyInState`。
    pub async fn resolve(
        pool: &PgPool,
        emergency_id: &str,
        resolver_id: &str,
    ) -> AppResult<Self> {
        let resolved = sqlx::query_as::<_, Emergency>(&format!(
            r#"
            UPDATE emergencies
            SET status = 'resolved', resolved_at = NOW(), resolved_by = $1
            WHERE emergency_id = $2 AND status = 'active'
            RETURNING {EMERGENCY_COLUMNS}
            "#
        ))
        .bind(resolver_id)
        .bind(emergency_id)
        .fetch_optional(pool)
        .await?;

        match resolved {
            Some(emergency) => Ok(emergency),
            // 区分“不存在”和“已处置”
            None => {
                let exists: Option<(String,)> =
                    sqlx::query_as("SELECT status FROM emergencies WHERE emergency_id = $1")
                        .bind(emergency_id)
                        .fetch_optional(pool)
                        .await?;
                match exists {
                    Some(_) => Err(AppError::AlreadyInState),
                    None => Err(AppError::NotFound),
                }
            }
        }
    }

    pub async fn list_active(pool: &PgPool) -> AppResult<Vec<Self>> {
        let emergencies = sqlx::query_as::<_, Emergency>(&format!(
            r#"
            SELECT {EMERGENCY_COLUMNS}
            FROM emergencies
            WHERE status = 'active'
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await?;

        Ok(emergencies)
    }
}
