use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;

use crate::cache::keys::user_gate_key;
use crate::cache::operations::events::{CircleEvent, EventOperations};
use crate::cache::operations::presence::PresenceCacheOperations;
use crate::core::gate::Location;
use crate::core::movement::MovementStatus;
use crate::core::session::LocationSink;
use crate::core::store::UserLocation;
use crate::error::AppError;

/// user_locations 表的一行，和用户表连查出昵称
#[derive(Debug, Serialize, FromRow)]
pub struct StoredUserLocation {
    pub circle_id: String,
    pub user_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub address: Option<String>,
    pub movement_status: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UpdateLocationResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// 位置流上设备发来的消息
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 原始定位采样
    Sample {
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        speed: Option<f64>,
        heading: Option<f64>,
    },
    /// 设备定位权限被拒绝——必须显式上报，和"还没有采样"区分开
    PermissionDenied,
    /// 切换位置共享
    ToggleSharing,
}

impl StoredUserLocation {
    /// 对每个开启位置共享的圈子按 (circle_id, user_id) upsert，
    /// 不保留历史（历史留存由外部按圈子设置处理）
    pub async fn upsert_for_circles(
        pool: &PgPool,
        user_id: &str,
        circle_ids: &[String],
        location: &Location,
    ) -> Result<(), AppError> {
        for circle_id in circle_ids {
            sqlx::query(
                r#"
                INSERT INTO user_locations (
                    circle_id, user_id, latitude, longitude, accuracy, speed,
                    heading, address, movement_status, captured_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (circle_id, user_id) DO UPDATE SET
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    accuracy = EXCLUDED.accuracy,
                    speed = EXCLUDED.speed,
                    heading = EXCLUDED.heading,
                    address = EXCLUDED.address,
                    movement_status = EXCLUDED.movement_status,
                    captured_at = EXCLUDED.captured_at
                "#,
            )
            .bind(circle_id)
            .bind(user_id)
            .bind(location.latitude)
            .bind(location.longitude)
            .bind(location.accuracy)
            .bind(location.speed)
            .bind(location.heading)
            .bind(&location.address)
            .bind(location.movement_status.as_str())
            .bind(location.timestamp)
            .execute(pool)
            .await?;
        }

        Ok(())
    }

    pub async fn find_by_circle(
        pool: &PgPool,
        circle_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let locations = sqlx::query_as::<_, StoredUserLocation>(
            r#"
            SELECT l.circle_id, l.user_id, u.name, l.latitude, l.longitude,
                   l.accuracy, l.speed, l.heading, l.address, l.movement_status,
                   l.captured_at
            FROM user_locations l
            JOIN users u ON u.user_id = l.user_id
            WHERE l.circle_id = $1
            ORDER BY l.captured_at DESC
            "#,
        )
        .bind(circle_id)
        .fetch_all(pool)
        .await?;

        Ok(locations)
    }

    pub fn movement(&self) -> MovementStatus {
        MovementStatus::from_str_or_stationary(&self.movement_status)
    }
}

/// 只允许向开启了位置共享的圈子广播
pub async fn sharing_circle_ids(pool: &PgPool, user_id: &str) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT c.circle_id
        FROM circles c
        JOIN circle_members m ON m.circle_id = c.circle_id
        WHERE m.user_id = $1 AND c.location_sharing = true
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// 单次上报路径的最小间隔闸门：SET NX EX，键存在说明间隔未到。
/// 会话流有状态闸门在 core::gate，这里只为无会话的 HTTP 路径兜底。
pub async fn acquire_min_interval(
    redis: &Arc<RedisClient>,
    user_id: &str,
    interval_secs: u64,
) -> Result<bool, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;

    let acquired: Option<String> = redis::cmd("SET")
        .arg(user_gate_key(user_id))
        .arg(Utc::now().timestamp())
        .arg("NX")
        .arg("EX")
        .arg(interval_secs)
        .query_async(&mut conn)
        .await?;

    Ok(acquired.is_some())
}

/// 被接受的位置更新落库 + 缓存 + 圈子广播。
/// 实现 core 的 LocationSink，会话任务只看到这一个出口。
pub struct PersistingSink {
    pool: PgPool,
    redis: Arc<RedisClient>,
    circle_ids: Vec<String>,
}

impl PersistingSink {
    pub fn new(pool: PgPool, redis: Arc<RedisClient>, circle_ids: Vec<String>) -> Self {
        Self {
            pool,
            redis,
            circle_ids,
        }
    }
}

#[async_trait]
impl LocationSink for PersistingSink {
    async fn deliver(&self, user_id: &str, location: &Location) -> Result<(), AppError> {
        StoredUserLocation::upsert_for_circles(&self.pool, user_id, &self.circle_ids, location)
            .await?;

        // 缓存最新位置，失败不阻断广播
        if let Err(e) = PresenceCacheOperations::update_user_status(
            &self.redis,
            user_id,
            true,
            Some(location.clone()),
        )
        .await
        {
            tracing::debug!("位置缓存更新失败: {}", e);
        }

        for circle_id in &self.circle_ids {
            EventOperations::publish(
                &self.redis,
                circle_id,
                &CircleEvent::Location(UserLocation {
                    user_id: user_id.to_string(),
                    circle_id: circle_id.clone(),
                    location: location.clone(),
                }),
            )
            .await?;
        }

        Ok(())
    }
}
