use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::keys::user_status_key;
use crate::core::gate::Location;

// 状态缓存过期时间，单位秒
const STATUS_CACHE_EXPIRE: u64 = 3600;

/// 缓存的用户在线状态与最近一次位置
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedUserStatus {
    pub user_id: String,
    pub online: bool,
    pub last_seen: i64,
    pub location: Option<Location>,
}

/// 用户状态缓存操作
pub struct PresenceCacheOperations;

impl PresenceCacheOperations {
    /// 更新用户在线状态与实时位置
    pub async fn update_user_status(
        redis: &Arc<RedisClient>,
        user_id: &str,
        online: bool,
        location: Option<Location>,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let status = CachedUserStatus {
            user_id: user_id.to_string(),
            online,
            last_seen: chrono::Utc::now().timestamp(),
            location,
        };

        let json = serde_json::to_string(&status).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::IoError, "序列化错误", e.to_string()))
        })?;

        let _: () = conn
            .set_ex(user_status_key(user_id), json, STATUS_CACHE_EXPIRE)
            .await?;

        Ok(())
    }

    /// 获取用户在线状态
    pub async fn get_user_status(
        redis: &Arc<RedisClient>,
        user_id: &str,
    ) -> Result<Option<CachedUserStatus>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let result: Option<String> = conn.get(user_status_key(user_id)).await?;

        match result {
            Some(json) => match serde_json::from_str(&json) {
                Ok(status) => Ok(Some(status)),
                // 旧格式的缓存条目当作不存在
                Err(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// 标记用户离线（登出时调用）
    pub async fn mark_offline(
        redis: &Arc<RedisClient>,
        user_id: &str,
    ) -> Result<(), redis::RedisError> {
        Self::update_user_status(redis, user_id, false, None).await
    }
}
