use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;

use crate::error::AppResult;
use super::lifecycle::GroupType;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub join_code: String,
    pub group_type: String,
    pub protected: bool,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub member_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct GroupMember {
    pub user_id: String,
    pub nickname: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub name: String,
    pub join_code: String,
    pub group_type: String,
    pub member_count: i32,
    pub protected: bool,
}

// 缓存相关常量
const GROUP_CACHE_EXPIRE: u64 = 600; // 群组缓存过期时间，单位秒
const GROUP_ID_CACHE_PREFIX: &str = "group:id:"; // 群组ID缓存前缀

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        Self {
            group_id: group.group_id,
            name: group.name,
            join_code: group.join_code,
            group_type: group.group_type,
            member_count: group.member_count,
            protected: group.protected,
        }
    }
}

impl Group {
    /// 解析类型标签。历史数据可能带未知标签，调用方需按保守路径处理。
    pub fn kind(&self) -> Option<GroupType> {
        GroupType::parse(&self.group_type)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
    ) -> AppResult<Option<Self>> {
        // 尝试从缓存读取
        let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(group) = serde_json::from_str::<Group>(&json_str) {
                    tracing::debug!("Get group from cache: {}", cache_key);
                    return Ok(Some(group));
                }
            }
        }

        let group = sqlx::query_as::<_, Group>(
            r#"
            SELECT group_id, name, join_code, group_type, protected,
                   creator_id, created_at, member_count
            FROM groups
            WHERE group_id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        // 缓存结果
        if let Some(ref g) = group {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(g) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, GROUP_CACHE_EXPIRE).await;
                    tracing::debug!("Set group to cache: {}", cache_key);
                }
            }
        }

        Ok(group)
    }

    /// 加入码查询不走缓存，加入操作低频且必须看到最新状态
    pub async fn find_by_join_code(pool: &PgPool, code: &str) -> AppResult<Option<Self>> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            SELECT group_id, name, join_code, group_type, protected,
                   creator_id, created_at, member_count
            FROM groups
            WHERE join_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await?;

        Ok(group)
    }

    pub async fn is_member(pool: &PgPool, group_id: &str, user_id: &str) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM group_members
                WHERE group_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    pub async fn members(pool: &PgPool, group_id: &str) -> AppResult<Vec<GroupMember>> {
        let members = sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT gm.user_id, u.nickname, gm.joined_at
            FROM group_members gm
            JOIN users u ON gm.user_id = u.user_id
            WHERE gm.group_id = $1
            ORDER BY gm.joined_at
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    pub async fn invalidate_cache(redis: &Arc<RedisClient>, group_id: &str) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }
    }
}
