use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::keys::{circle_id_key, circle_invite_key};
use crate::error::AppError;
use crate::utils::generate_invite_code;

// 缓存相关常量
const CIRCLE_CACHE_EXPIRE: u64 = 600; // 圈子缓存过期时间，单位秒

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Circle {
    pub circle_id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub allow_location_history: bool,
    pub allow_geofencing: bool,
    pub emergency_contacts: Vec<String>,
    pub location_sharing: bool,
    pub check_in_interval_minutes: i32,
    pub member_count: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CircleSettings {
    pub allow_location_history: bool,
    pub allow_geofencing: bool,
    pub emergency_contacts: Vec<String>,
    pub location_sharing: bool,
    pub check_in_interval_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateCircleRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinCircleRequest {
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
pub struct JoinCircleResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle: Option<CircleInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub circle_id: String,
    pub settings: CircleSettings,
}

#[derive(Debug, Serialize)]
pub struct CircleInfo {
    pub circle_id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub member_count: i32,
    pub settings: CircleSettings,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MemberInfo {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

/// 加入圈子的结果：两种失败都是可报告的业务结果，不是异常路径
#[derive(Debug)]
pub enum JoinOutcome {
    Joined(Circle),
    AlreadyMember,
    NotFound,
}

impl From<Circle> for CircleInfo {
    fn from(circle: Circle) -> Self {
        Self {
            circle_id: circle.circle_id,
            name: circle.name,
            description: circle.description,
            owner_id: circle.owner_id,
            invite_code: circle.invite_code,
            created_at: circle.created_at,
            member_count: circle.member_count,
            settings: CircleSettings {
                allow_location_history: circle.allow_location_history,
                allow_geofencing: circle.allow_geofencing,
                emergency_contacts: circle.emergency_contacts,
                location_sharing: circle.location_sharing,
                check_in_interval_minutes: circle.check_in_interval_minutes,
            },
        }
    }
}

const CIRCLE_COLUMNS: &str = r#"
    circle_id, name, description, owner_id, invite_code, created_at,
    allow_location_history, allow_geofencing, emergency_contacts,
    location_sharing, check_in_interval_minutes, member_count
"#;

impl Circle {
    /// 创建圈子：生成邀请码并把创建者放进成员集合。
    /// 邀请码不做唯一性重试，碰撞由唯一索引报错兜底。
    pub async fn create(
        pool: &PgPool,
        req: CreateCircleRequest,
        owner_id: &str,
        invite_code_length: usize,
    ) -> Result<Self, AppError> {
        let circle_id = Uuid::new_v4().to_string();
        let invite_code = generate_invite_code(invite_code_length);

        let mut tx = pool.begin().await?;

        let circle = sqlx::query_as::<_, Circle>(&format!(
            r#"
            INSERT INTO circles (
                circle_id, name, description, owner_id, invite_code, created_at,
                allow_location_history, allow_geofencing, emergency_contacts,
                location_sharing, check_in_interval_minutes, member_count
            )
            VALUES ($1, $2, $3, $4, $5, NOW(), false, false, '{{}}', true, 60, 1)
            RETURNING {}
            "#,
            CIRCLE_COLUMNS
        ))
        .bind(&circle_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(owner_id)
        .bind(&invite_code)
        .fetch_one(&mut *tx)
        .await?;

        // 创建的同时把创建者加入成员集合
        sqlx::query(
            r#"
            INSERT INTO circle_members (circle_id, user_id, joined_at)
            VALUES ($1, $2, NOW())
            "#,
        )
        .bind(&circle_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(circle)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        circle_id: &str,
    ) -> Result<Option<Self>, AppError> {
        // 尝试从缓存读取
        let cache_key = circle_id_key(circle_id);
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
            if let Ok(json_str) = cached {
                if let Ok(circle) = serde_json::from_str::<Circle>(&json_str) {
                    tracing::debug!("Get circle from cache: {}", cache_key);
                    return Ok(Some(circle));
                }
            }
        }

        let circle = sqlx::query_as::<_, Circle>(&format!(
            "SELECT {} FROM circles WHERE circle_id = $1",
            CIRCLE_COLUMNS
        ))
        .bind(circle_id)
        .fetch_optional(pool)
        .await?;

        if let Some(ref c) = circle {
            Self::write_cache(redis, &cache_key, c).await;
        }

        Ok(circle)
    }

    /// 邀请码查找：区分大小写的精确匹配
    pub async fn find_by_invite_code(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        invite_code: &str,
    ) -> Result<Option<Self>, AppError> {
        let cache_key = circle_invite_key(invite_code);
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
            if let Ok(json_str) = cached {
                if let Ok(circle) = serde_json::from_str::<Circle>(&json_str) {
                    return Ok(Some(circle));
                }
            }
        }

        let circle = sqlx::query_as::<_, Circle>(&format!(
            "SELECT {} FROM circles WHERE invite_code = $1",
            CIRCLE_COLUMNS
        ))
        .bind(invite_code)
        .fetch_optional(pool)
        .await?;

        if let Some(ref c) = circle {
            Self::write_cache(redis, &cache_key, c).await;
        }

        Ok(circle)
    }

    /// 按邀请码加入。成员追加是原子的集合并集（ON CONFLICT DO NOTHING），
    /// 不是整表读改写：两个不同用户并发加入都会成功，重复加入通过
    /// rows_affected 识别为 AlreadyMember。
    pub async fn join_by_code(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        invite_code: &str,
        user_id: &str,
    ) -> Result<JoinOutcome, AppError> {
        let circle = match Self::find_by_invite_code(pool, redis, invite_code).await? {
            Some(circle) => circle,
            None => return Ok(JoinOutcome::NotFound),
        };

        let mut tx = pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO circle_members (circle_id, user_id, joined_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (circle_id, user_id) DO NOTHING
            "#,
        )
        .bind(&circle.circle_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(JoinOutcome::AlreadyMember);
        }

        sqlx::query(
            r#"
            UPDATE circles
            SET member_count = member_count + 1
            WHERE circle_id = $1
            "#,
        )
        .bind(&circle.circle_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // 成员数变了，清除相关缓存
        Self::invalidate_cache(redis, &circle.circle_id, invite_code).await;

        let joined = Self::find_by_id(pool, redis, &circle.circle_id)
            .await?
            .unwrap_or(circle);
        Ok(JoinOutcome::Joined(joined))
    }

    pub async fn leave(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        circle_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM circle_members
            WHERE circle_id = $1 AND user_id = $2
            "#,
        )
        .bind(circle_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE circles
            SET member_count = member_count - 1
            WHERE circle_id = $1
            "#,
        )
        .bind(circle_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Ok(Some(circle)) = Self::find_by_id(pool, redis, circle_id).await {
            Self::invalidate_cache(redis, circle_id, &circle.invite_code).await;
        }

        Ok(())
    }

    pub async fn circles_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, AppError> {
        let circles = sqlx::query_as::<_, Circle>(&format!(
            r#"
            SELECT {} FROM circles
            WHERE circle_id IN (SELECT circle_id FROM circle_members WHERE user_id = $1)
            ORDER BY created_at
            "#,
            CIRCLE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(circles)
    }

    pub async fn ids_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT circle_id FROM circle_members WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn is_member(
        pool: &PgPool,
        circle_id: &str,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM circle_members
                WHERE circle_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(circle_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    pub async fn members(pool: &PgPool, circle_id: &str) -> Result<Vec<MemberInfo>, AppError> {
        let members = sqlx::query_as::<_, MemberInfo>(
            r#"
            SELECT u.user_id, u.name, u.avatar, u.is_online, u.last_seen, m.joined_at
            FROM circle_members m
            JOIN users u ON u.user_id = m.user_id
            WHERE m.circle_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(circle_id)
        .fetch_all(pool)
        .await?;

        Ok(members)
    }

    /// 更新圈子设置，只有圈主可以操作
    pub async fn update_settings(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        circle_id: &str,
        owner_id: &str,
        settings: &CircleSettings,
    ) -> Result<Self, AppError> {
        let circle = sqlx::query_as::<_, Circle>(&format!(
            r#"
            UPDATE circles
            SET allow_location_history = $3,
                allow_geofencing = $4,
                emergency_contacts = $5,
                location_sharing = $6,
                check_in_interval_minutes = $7
            WHERE circle_id = $1 AND owner_id = $2
            RETURNING {}
            "#,
            CIRCLE_COLUMNS
        ))
        .bind(circle_id)
        .bind(owner_id)
        .bind(settings.allow_location_history)
        .bind(settings.allow_geofencing)
        .bind(&settings.emergency_contacts)
        .bind(settings.location_sharing)
        .bind(settings.check_in_interval_minutes)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

        Self::invalidate_cache(redis, circle_id, &circle.invite_code).await;

        Ok(circle)
    }

    async fn write_cache(redis: &Arc<RedisClient>, cache_key: &str, circle: &Circle) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(circle) {
                let _: Result<(), redis::RedisError> = conn
                    .set_ex(cache_key, json_str, CIRCLE_CACHE_EXPIRE)
                    .await;
                tracing::debug!("Set circle to cache: {}", cache_key);
            }
        }
    }

    async fn invalidate_cache(redis: &Arc<RedisClient>, circle_id: &str, invite_code: &str) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let _: Result<(), redis::RedisError> = conn.del(circle_id_key(circle_id)).await;
            let _: Result<(), redis::RedisError> = conn.del(circle_invite_key(invite_code)).await;
        }
    }
}
