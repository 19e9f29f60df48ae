//! 群组生命周期：会话启动时的归属解析、加入/退出、空群清理级联、解散。
//!
//! 不变量：
//! - 个人组ID由用户ID确定性派生，两个用户永远不会共享同一个个人组；
//! - 共享组存在期间成员列表非空，清空后即删除（受保护组除外）；
//! - 级联删除先删子资源、最后删群组行，中途崩溃最多留下一个空壳群组，
//!   不会出现指向已删群组的子资源。

use std::sync::Arc;

use redis::Client as RedisClient;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::permissions::{Action, can_perform};
use crate::utils::{Claims, derive_join_code};

use super::model::Group;

/// 旧版共享大组的固定ID。存量用户的归属指向它，首次解析时迁移走。
pub const LEGACY_SHARED_GROUP: &str = "default_group";

const PERSONAL_PREFIX: &str = "personal-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    Personal,
    Shared,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Personal => "personal",
            GroupType::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Option<GroupType> {
        match s {
            "personal" => Some(GroupType::Personal),
            "shared" => Some(GroupType::Shared),
            _ => None,
        }
    }
}

/// 用户ID到个人组ID的确定性派生
pub fn personal_group_id(user_id: &str) -> String {
    format!("{}{}", PERSONAL_PREFIX, user_id)
}

#[derive(Debug, PartialEq, Eq)]
pub enum StoredRef {
    Missing,
    Legacy,
    Existing(String),
}

/// 归属引用分类：缺失和旧版大组都走个人组派生路径
pub fn classify_stored_ref(stored: Option<&str>) -> StoredRef {
    match stored {
        None | Some("") => StoredRef::Missing,
        Some(LEGACY_SHARED_GROUP) => StoredRef::Legacy,
        Some(other) => StoredRef::Existing(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Preserve,
    Delete,
}

/// 空群清理决策。纯函数。
///
/// - 成员非空：保留；
/// - 受保护组：无条件保留；
/// - 个人组：保留，个人组代表单人模式，允许短暂无成员；
/// - 未知类型标签：保守保留；
/// - 其余（空的、未受保护的共享组）：删除。
pub fn cleanup_action(member_count: i64, kind: Option<GroupType>, protected: bool) -> CleanupAction {
    if member_count > 0 || protected {
        return CleanupAction::Preserve;
    }
    match kind {
        Some(GroupType::Shared) => CleanupAction::Delete,
        Some(GroupType::Personal) | None => CleanupAction::Preserve,
    }
}

#[derive(Debug, Serialize)]
pub struct ResolveOutcome {
    pub group_id: String,
    pub created: bool,
    pub migrated: bool,
}

/// 会话启动时解析用户归属的群组。
///
/// 归属缺失或指向旧版大组时，派生个人组并落库（迁移只记录一次）；
/// 其余情况原样返回已存储的归属。
pub async fn resolve_group(pool: &PgPool, user_id: &str) -> AppResult<ResolveOutcome> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT group_ref FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    let (stored,) = row.ok_or(AppError::NotFound)?;

    let migrated = match classify_stored_ref(stored.as_deref()) {
        StoredRef::Existing(group_id) => {
            return Ok(ResolveOutcome {
                group_id,
                created: false,
                migrated: false,
            });
        }
        StoredRef::Missing => false,
        StoredRef::Legacy => true,
    };

    let personal_id = personal_group_id(user_id);
    let mut tx = pool.begin().await?;

    let created = sqlx::query(
        r#"
        INSERT INTO groups (group_id, name, join_code, group_type, protected,
                            creator_id, created_at, member_count)
        VALUES ($1, $2, $3, 'personal', FALSE, $4, NOW(), 1)
        ON CONFLICT (group_id) DO NOTHING
        "#,
    )
    .bind(&personal_id)
    .bind(format!("{}的个人组", user_id))
    .bind(derive_join_code(&personal_id))
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, joined_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(&personal_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    // 迁移时间戳只在第一次迁移写入，重复解析是无操作
    sqlx::query(
        r#"
        UPDATE users
        SET group_ref = $1,
            migrated_at = CASE WHEN $2 THEN COALESCE(migrated_at, NOW()) ELSE migrated_at END
        WHERE user_id = $3
        "#,
    )
    .bind(&personal_id)
    .bind(migrated)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if migrated {
        tracing::info!("migrated user {} off {}", user_id, LEGACY_SHARED_GROUP);
    }

    Ok(ResolveOutcome {
        group_id: personal_id,
        created,
        migrated,
    })
}

/// 新建共享组，创建者自动入组，其归属引用同步更新
pub async fn create_group(pool: &PgPool, name: &str, creator_id: &str) -> AppResult<Group> {
    let group_id = Uuid::new_v4().to_string();
    let join_code = derive_join_code(&group_id);

    let mut tx = pool.begin().await?;

    let group = sqlx::query_as::<_, Group>(
        r#"
        INSERT INTO groups (group_id, name, join_code, group_type, protected,
                            creator_id, created_at, member_count)
        VALUES ($1, $2, $3, 'shared', FALSE, $4, NOW(), 1)
        RETURNING group_id, name, join_code, group_type, protected,
                  creator_id, created_at, member_count
        "#,
    )
    .bind(&group_id)
    .bind(name)
    .bind(&join_code)
    .bind(creator_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, joined_at)
        VALUES ($1, $2, NOW())
        "#,
    )
    .bind(&group_id)
    .bind(creator_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET group_ref = $1 WHERE user_id = $2")
        .bind(&group_id)
        .bind(creator_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(group)
}

/// 凭加入码入组。重复加入返回 `AlreadyInState`，handler 层视为成功。
/// 并发加入依赖成员表主键唯一约束，不加额外锁。
pub async fn join_group(
    pool: &PgPool,
    redis: &Arc<RedisClient>,
    user_id: &str,
    code: &str,
) -> AppResult<Group> {
    let group = Group::find_by_join_code(pool, code)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, joined_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(&group.group_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Err(AppError::AlreadyInState);
    }

    sqlx::query("UPDATE groups SET member_count = member_count + 1 WHERE group_id = $1")
        .bind(&group.group_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE users SET group_ref = $1 WHERE user_id = $2")
        .bind(&group.group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Group::invalidate_cache(redis, &group.group_id).await;

    Ok(group)
}

/// 退组。无论清理结果如何，用户的归属引用都会被清空；
/// 重复退出是无操作。
pub async fn leave_group(
    pool: &PgPool,
    redis: &Arc<RedisClient>,
    user_id: &str,
    group_id: &str,
) -> AppResult<CleanupAction> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        r#"
        DELETE FROM group_members
        WHERE group_id = $1 AND user_id = $2
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if removed > 0 {
        sqlx::query("UPDATE groups SET member_count = member_count - 1 WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("UPDATE users SET group_ref = NULL WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Group::invalidate_cache(redis, group_id).await;

    cleanup_empty_group(pool, redis, group_id).await
}

/// 空群清理。决策见 [`cleanup_action`]；删除路径先清子资源再删群组行，
/// 全程单事务。
pub async fn cleanup_empty_group(
    pool: &PgPool,
    redis: &Arc<RedisClient>,
    group_id: &str,
) -> AppResult<CleanupAction> {
    let mut tx = pool.begin().await?;

    let row: Option<(String, bool, i64)> = sqlx::query_as(
        r#"
        SELECT g.group_type, g.protected,
               (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.group_id)
        FROM groups g
        WHERE g.group_id = $1
        FOR UPDATE OF g
        "#,
    )
    .bind(group_id)
    .fetch_optional(&mut *tx)
    .await?;

    // 群组已不存在，视为已清理
    let Some((kind, protected, member_count)) = row else {
        return Ok(CleanupAction::Preserve);
    };

    match cleanup_action(member_count, GroupType::parse(&kind), protected) {
        CleanupAction::Preserve => Ok(CleanupAction::Preserve),
        CleanupAction::Delete => {
            cascade_delete(&mut tx, group_id).await?;
            tx.commit().await?;

            Group::invalidate_cache(redis, group_id).await;
            tracing::info!("deleted empty group {}", group_id);

            Ok(CleanupAction::Delete)
        }
    }
}

/// 解散群组。要求调用者既是创建者又有组织者权限；
/// 解散前给所有在组成员补记审计项并清空其归属引用。
pub async fn delete_group(
    pool: &PgPool,
    redis: &Arc<RedisClient>,
    group_id: &str,
    claims: &Claims,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let row: Option<(String,)> =
        sqlx::query_as("SELECT creator_id FROM groups WHERE group_id = $1 FOR UPDATE")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (creator_id,) = row.ok_or(AppError::NotFound)?;

    let is_owner = creator_id == claims.sub;
    if !can_perform(claims.role, Action::DeleteGroup, is_owner) {
        return Err(AppError::PermissionDenied);
    }

    sqlx::query(
        r#"
        UPDATE users
        SET deleted_groups = array_append(deleted_groups, $1),
            group_ref = NULL
        WHERE user_id IN (SELECT user_id FROM group_members WHERE group_id = $1)
        "#,
    )
    .bind(group_id)
    .execute(&mut *tx)
    .await?;

    cascade_delete(&mut tx, group_id).await?;
    tx.commit().await?;

    Group::invalidate_cache(redis, group_id).await;
    tracing::info!("group {} deleted by {}", group_id, claims.sub);

    Ok(())
}

/// 组织者移出成员。被移出者的归属引用清空；清理决策随后照常评估。
pub async fn kick_member(
    pool: &PgPool,
    redis: &Arc<RedisClient>,
    group_id: &str,
    target_id: &str,
    claims: &Claims,
) -> AppResult<()> {
    if !can_perform(claims.role, Action::KickMember, false) {
        return Err(AppError::PermissionDenied);
    }
    if target_id == claims.sub {
        return Err(AppError::Validation("不能移出自己，请使用退出接口".into()));
    }

    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        r#"
        DELETE FROM group_members
        WHERE group_id = $1 AND user_id = $2
        "#,
    )
    .bind(group_id)
    .bind(target_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound);
    }

    sqlx::query("UPDATE groups SET member_count = member_count - 1 WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE users SET group_ref = NULL WHERE user_id = $1")
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Group::invalidate_cache(redis, group_id).await;

    cleanup_empty_group(pool, redis, group_id).await?;
    Ok(())
}

/// 级联删除：子资源在前，群组行最后
async fn cascade_delete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    group_id: &str,
) -> AppResult<()> {
    sqlx::query("DELETE FROM messages WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM user_locations WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM group_members WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM groups WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_id_is_deterministic_and_per_user() {
        assert_eq!(personal_group_id("u1"), "personal-u1");
        assert_eq!(personal_group_id("u1"), personal_group_id("u1"));
        assert_ne!(personal_group_id("u1"), personal_group_id("u2"));
    }

    #[test]
    fn missing_and_legacy_refs_take_the_derivation_path() {
        assert_eq!(classify_stored_ref(None), StoredRef::Missing);
        assert_eq!(classify_stored_ref(Some("")), StoredRef::Missing);
        assert_eq!(classify_stored_ref(Some(LEGACY_SHARED_GROUP)), StoredRef::Legacy);
    }

    #[test]
    fn concrete_refs_are_returned_unchanged() {
        assert_eq!(
            classify_stored_ref(Some("personal-u2")),
            StoredRef::Existing("personal-u2".into())
        );
        assert_eq!(
            classify_stored_ref(Some("some-shared-id")),
            StoredRef::Existing("some-shared-id".into())
        );
    }

    #[test]
    fn cleanup_never_deletes_populated_groups() {
        for kind in [Some(GroupType::Shared), Some(GroupType::Personal), None] {
            for protected in [true, false] {
                assert_eq!(cleanup_action(1, kind, protected), CleanupAction::Preserve);
                assert_eq!(cleanup_action(30, kind, protected), CleanupAction::Preserve);
            }
        }
    }

    #[test]
    fn cleanup_never_deletes_protected_groups() {
        assert_eq!(
            cleanup_action(0, Some(GroupType::Shared), true),
            CleanupAction::Preserve
        );
    }

    #[test]
    fn empty_personal_groups_persist() {
        assert_eq!(
            cleanup_action(0, Some(GroupType::Personal), false),
            CleanupAction::Preserve
        );
    }

    #[test]
    fn empty_unprotected_shared_groups_are_deleted() {
        assert_eq!(
            cleanup_action(0, Some(GroupType::Shared), false),
            CleanupAction::Delete
        );
    }

    #[test]
    fn unknown_type_tags_are_preserved() {
        assert_eq!(cleanup_action(0, GroupType::parse("event"), false), CleanupAction::Preserve);
    }

    #[test]
    fn group_type_round_trips_through_text() {
        for kind in [GroupType::Personal, GroupType::Shared] {
            assert_eq!(GroupType::parse(kind.as_str()), Some(kind));
        }
    }
}
