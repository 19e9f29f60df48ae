use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::FeedEvent;
use crate::routes::group::Group;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct MessageWithNickname {
    pub message_id: String,
    pub group_id: String,
    pub user_id: String,
    pub nickname: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub group_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct GetMessagesRequest {
    pub group_id: String,
    pub message_id: Option<String>,
    pub limit: Option<i64>,
}

// 缓存相关的常量
const MESSAGE_CACHE_EXPIRE: u64 = 300; // 消息缓存过期时间，单位秒
const MESSAGE_CACHE_PREFIX: &str = "msg:group:"; // 消息缓存前缀

impl From<MessageWithNickname> for FeedEvent {
    fn from(msg: MessageWithNickname) -> Self {
        FeedEvent {
            message_id: msg.message_id,
            group_id: msg.group_id,
            user_id: msg.user_id,
            nickname: msg.nickname,
            content: msg.content,
            created_at: msg.created_at,
        }
    }
}

impl MessageWithNickname {
    /// 仅组内成员可以发消息
    pub async fn create(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        req: CreateMessageRequest,
        user_id: &str,
    ) -> AppResult<Self> {
        if !Group::is_member(pool, &req.group_id, user_id).await? {
            return Err(AppError::PermissionDenied);
        }

        let message_id = Uuid::new_v4().to_string();

        let message = sqlx::query_as::<_, MessageWithNickname>(
            r#"
            WITH inserted AS (
                INSERT INTO messages (message_id, group_id, user_id, content, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING message_id, group_id, user_id, content, created_at
            )
            SELECT i.message_id, i.group_id, i.user_id, u.nickname, i.content, i.created_at
            FROM inserted i
            JOIN users u ON i.user_id = u.user_id
            "#,
        )
        .bind(&message_id)
        .bind(&req.group_id)
        .bind(user_id)
        .bind(&req.content)
        .fetch_one(pool)
        .await?;

        // 发送新消息后，清除相关的消息缓存
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", MESSAGE_CACHE_PREFIX, req.group_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }

        Ok(message)
    }

    pub async fn get_messages(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        req: GetMessagesRequest,
        user_id: &str,
    ) -> AppResult<Vec<MessageWithNickname>> {
        if !Group::is_member(pool, &req.group_id, user_id).await? {
            return Err(AppError::PermissionDenied);
        }

        let limit = req.limit.map(|l| l.clamp(-100, 100)).unwrap_or(50);

        // 如果没有指定message_id获取最新消息，检查缓存
        if req.message_id.is_none() && limit.abs() <= 50 {
            let cache_key = format!("{}{}", MESSAGE_CACHE_PREFIX, req.group_id);

            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

                if let Ok(json_str) = cached {
                    if let Ok(messages) =
                        serde_json::from_str::<Vec<MessageWithNickname>>(&json_str)
                    {
                        tracing::debug!("Get messages from cache: {}", cache_key);
                        return Ok(messages);
                    }
                }
            }
        }

        let messages = if let Some(message_id) = req.message_id {
            if limit >= 0 {
                Self::newer_than(pool, &req.group_id, &message_id, limit.abs()).await?
            } else {
                Self::older_than(pool, &req.group_id, &message_id, limit.abs()).await?
            }
        } else {
            let msgs = Self::latest(pool, &req.group_id, limit.abs()).await?;

            // 最新一页缓存到Redis
            if limit.abs() <= 50 {
                if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                    let cache_key = format!("{}{}", MESSAGE_CACHE_PREFIX, req.group_id);
                    if let Ok(json_str) = serde_json::to_string(&msgs) {
                        let _: Result<(), redis::RedisError> =
                            conn.set_ex(&cache_key, json_str, MESSAGE_CACHE_EXPIRE).await;
                        tracing::debug!("Set messages to cache: {}", cache_key);
                    }
                }
            }

            msgs
        };

        Ok(messages)
    }

    async fn older_than(
        pool: &PgPool,
        group_id: &str,
        message_id: &str,
        limit: i64,
    ) -> AppResult<Vec<MessageWithNickname>> {
        let messages = sqlx::query_as::<_, MessageWithNickname>(
            r#"
            SELECT m.message_id, m.group_id, m.user_id, u.nickname, m.content, m.created_at
            FROM messages m
            JOIN users u ON m.user_id = u.user_id
            WHERE m.group_id = $1
                AND m.created_at <= (
                    SELECT created_at
                    FROM messages
                    WHERE message_id = $2
                )
            ORDER BY m.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(group_id)
        .bind(message_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    async fn newer_than(
        pool: &PgPool,
        group_id: &str,
        message_id: &str,
        limit: i64,
    ) -> AppResult<Vec<MessageWithNickname>> {
        let messages = sqlx::query_as::<_, MessageWithNickname>(
            r#"
            SELECT m.message_id, m.group_id, m.user_id, u.nickname, m.content, m.created_at
            FROM messages m
            JOIN users u ON m.user_id = u.user_id
            WHERE m.group_id = $1
                AND m.created_at >= (
                    SELECT created_at
                    FROM messages
                    WHERE message_id = $2
                )
            ORDER BY m.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(group_id)
        .bind(message_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    async fn latest(
        pool: &PgPool,
        group_id: &str,
        limit: i64,
    ) -> AppResult<Vec<MessageWithNickname>> {
        let messages = sqlx::query_as::<_, MessageWithNickname>(
            r#"
            SELECT m.message_id, m.group_id, m.user_id, u.nickname, m.content, m.created_at
            FROM messages m
            JOIN users u ON m.user_id = u.user_id
            WHERE m.group_id = $1
            ORDER BY m.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }
}
