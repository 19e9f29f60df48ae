use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};
use crate::routes::group::Group;

/// 组内成员的最新位置。每人每组只保留一条，由客户端周期性上报覆盖。
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct MemberLocation {
    pub group_id: String,
    pub user_id: String,
    pub nickname: String,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub group_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl MemberLocation {
    pub async fn upsert(
        pool: &PgPool,
        req: &UpdateLocationRequest,
        user_id: &str,
    ) -> AppResult<()> {
        if !Group::is_member(pool, &req.group_id, user_id).await? {
            return Err(AppError::PermissionDenied);
        }

        sqlx::query(
            r#"
            INSERT INTO user_locations (group_id, user_id, latitude, longitude, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (group_id, user_id)
            DO UPDATE SET latitude = $3, longitude = $4, updated_at = NOW()
            "#,
        )
        .bind(&req.group_id)
        .bind(user_id)
        .bind(req.latitude)
        .bind(req.longitude)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// 位置数据变化快且查询都在组内小范围，不走缓存。
    /// 超过3天没有上报的记录视为过期不再返回。
    pub async fn list_group(pool: &PgPool, group_id: &str) -> AppResult<Vec<Self>> {
        let locations = sqlx::query_as::<_, MemberLocation>(
            r#"
            SELECT ul.group_id, ul.user_id, u.nickname, ul.latitude, ul.longitude, ul.updated_at
            FROM user_locations ul
            JOIN users u ON ul.user_id = u.user_id
            WHERE ul.group_id = $1
                AND ul.updated_at > NOW() - INTERVAL '3 days'
            ORDER BY ul.updated_at DESC
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(locations)
    }

    pub async fn delete(pool: &PgPool, group_id: &str, user_id: &str) -> AppResult<()> {
        let removed = sqlx::query(
            r#"
            DELETE FROM user_locations
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();

        if removed == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
