use chrono::{DateTime, Utc};
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::operations::events::{CircleEvent, EventOperations};
use crate::core::gate::{Location, RawSample};
use crate::error::AppError;

/// 打卡种类：例行报平安、SOS 求救、解除警报
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckInKind {
    CheckIn,
    Sos,
    Safe,
}

impl CheckInKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInKind::CheckIn => "check-in",
            CheckInKind::Sos => "sos",
            CheckInKind::Safe => "safe",
        }
    }
}

/// check_ins 表的一行。只追加，永不修改。
#[derive(Debug, Serialize, FromRow)]
pub struct CheckIn {
    pub check_in_id: String,
    pub circle_id: String,
    pub user_id: String,
    pub kind: String,
    pub message: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub movement_status: String,
    pub captured_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckInRequest {
    pub circle_id: String,
    pub kind: CheckInKind,
    pub message: Option<String>,
    /// 设备当前位置采样；缺省时用最后一次落库的位置
    pub sample: Option<RawSample>,
}

#[derive(Debug, Deserialize)]
pub struct GetCheckInsRequest {
    pub circle_id: String,
    pub limit: Option<i64>,
}

impl CheckIn {
    pub async fn create(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        circle_id: &str,
        user_id: &str,
        kind: CheckInKind,
        message: Option<String>,
        location: &Location,
    ) -> Result<Self, AppError> {
        let check_in_id = Uuid::new_v4().to_string();

        let check_in = sqlx::query_as::<_, CheckIn>(
            r#"
            INSERT INTO check_ins (
                check_in_id, circle_id, user_id, kind, message,
                latitude, longitude, movement_status, captured_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING check_in_id, circle_id, user_id, kind, message,
                      latitude, longitude, movement_status, captured_at, created_at
            "#,
        )
        .bind(&check_in_id)
        .bind(circle_id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(&message)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.movement_status.as_str())
        .bind(location.timestamp)
        .fetch_one(pool)
        .await?;

        // SOS 等事件实时推给圈子成员；推送失败不影响落库结果
        let event = CircleEvent::CheckIn {
            check_in_id: check_in.check_in_id.clone(),
            circle_id: circle_id.to_string(),
            user_id: user_id.to_string(),
            kind: kind.as_str().to_string(),
            message: check_in.message.clone(),
            location: location.clone(),
        };
        if let Err(e) = EventOperations::publish(redis, circle_id, &event).await {
            tracing::warn!("打卡事件广播失败: {}", e);
        }

        Ok(check_in)
    }

    pub async fn find_by_circle(
        pool: &PgPool,
        circle_id: &str,
        limit: i64,
    ) -> Result<Vec<Self>, AppError> {
        let check_ins = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT check_in_id, circle_id, user_id, kind, message,
                   latitude, longitude, movement_status, captured_at, created_at
            FROM check_ins
            WHERE circle_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(circle_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(check_ins)
    }

    /// 打卡缺采样时退回最后一次落库的位置
    pub async fn last_known_location(
        pool: &PgPool,
        circle_id: &str,
        user_id: &str,
    ) -> Result<Option<Location>, AppError> {
        let row: Option<(f64, f64, Option<f64>, Option<f64>, String, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT latitude, longitude, accuracy, speed, movement_status, captured_at
                FROM user_locations
                WHERE circle_id = $1 AND user_id = $2
                "#,
            )
            .bind(circle_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(
            |(latitude, longitude, accuracy, speed, movement_status, captured_at)| Location {
                latitude,
                longitude,
                accuracy,
                speed,
                heading: None,
                address: None,
                movement_status: crate::core::movement::MovementStatus::from_str_or_stationary(
                    &movement_status,
                ),
                timestamp: captured_at,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CheckInKind::CheckIn).expect("json"),
            "\"check-in\""
        );
        assert_eq!(
            serde_json::to_string(&CheckInKind::Sos).expect("json"),
            "\"sos\""
        );
        assert_eq!(CheckInKind::Safe.as_str(), "safe");
    }
}
