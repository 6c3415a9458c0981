use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::keys::user_session_key;

/// 登录后缓存的会话身份，启动时据此恢复，登出时必须清除
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedSession {
    pub user_id: String,
    pub name: String,
    pub created_at: i64,
    pub expires_at: i64,
}

/// 会话缓存操作
pub struct SessionCacheOperations;

impl SessionCacheOperations {
    /// 缓存会话身份
    pub async fn cache_session(
        redis: &Arc<RedisClient>,
        user_id: &str,
        name: &str,
        ttl: u64,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let now = chrono::Utc::now().timestamp();
        let cached = CachedSession {
            user_id: user_id.to_string(),
            name: name.to_string(),
            created_at: now,
            expires_at: now + ttl as i64,
        };

        let json = serde_json::to_string(&cached).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::IoError, "序列化错误", e.to_string()))
        })?;

        let _: () = conn.set_ex(user_session_key(user_id), json, ttl).await?;

        Ok(())
    }

    /// 获取缓存的会话身份
    pub async fn get_session(
        redis: &Arc<RedisClient>,
        user_id: &str,
    ) -> Result<Option<CachedSession>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let result: Option<String> = conn.get(user_session_key(user_id)).await?;

        match result {
            Some(json) => {
                let cached = serde_json::from_str(&json).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "反序列化错误",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    /// 删除会话身份（登出时调用）
    pub async fn remove_session(
        redis: &Arc<RedisClient>,
        user_id: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let _: () = conn.del(user_session_key(user_id)).await?;

        Ok(())
    }
}
