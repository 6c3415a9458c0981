use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::keys::circle_events_channel;
use crate::core::gate::Location;
use crate::core::store::UserLocation;

/// 通过圈子频道推送给其他成员的事件
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CircleEvent {
    /// 某成员的位置更新（按用户 upsert，跨用户不保证顺序）
    Location(UserLocation),
    /// 安全打卡 / SOS / 解除警报
    CheckIn {
        check_in_id: String,
        circle_id: String,
        user_id: String,
        kind: String,
        message: Option<String>,
        location: Location,
    },
}

/// 圈子事件广播操作
pub struct EventOperations;

impl EventOperations {
    /// 向单个圈子频道发布事件
    pub async fn publish(
        redis: &Arc<RedisClient>,
        circle_id: &str,
        event: &CircleEvent,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(event).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::IoError, "序列化错误", e.to_string()))
        })?;

        let _: () = conn
            .publish(circle_events_channel(circle_id), payload)
            .await?;

        Ok(())
    }

    /// 订阅一组圈子频道，返回消息流
    pub async fn subscribe(
        redis: &Arc<RedisClient>,
        circle_ids: &[String],
    ) -> Result<impl futures_util::Stream<Item = redis::Msg> + use<>, redis::RedisError> {
        let mut pubsub = redis.get_async_pubsub().await?;
        for circle_id in circle_ids {
            pubsub.subscribe(circle_events_channel(circle_id)).await?;
        }
        Ok(pubsub.into_on_message())
    }
}
