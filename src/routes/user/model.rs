use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::utils::hash_password;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CheckTokenResponse {
    pub user_id: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            avatar: user.avatar,
            is_online: user.is_online,
            last_seen: user.last_seen,
        }
    }
}

impl User {
    /// 首次登录即建档，之后不做硬删除
    pub async fn create(pool: &PgPool, req: RegisterRequest) -> Result<Self, sqlx::Error> {
        let user_id = Uuid::new_v4().to_string();
        let password_hash = hash_password(&req.password)
            .map_err(|e| sqlx::Error::Protocol(format!("Failed to hash password: {}", e)))?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, name, email, phone, password_hash, is_online, last_seen, created_at)
            VALUES ($1, $2, $3, $4, $5, false, NOW(), NOW())
            RETURNING user_id, name, email, phone, avatar, password_hash, is_online, last_seen, created_at
            "#,
        )
        .bind(&user_id)
        .bind(&req.name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(&password_hash)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, name, email, phone, avatar, password_hash, is_online, last_seen, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, name, email, phone, avatar, password_hash, is_online, last_seen, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// 登录/登出时刷新在线标记与最后活跃时间
    pub async fn set_online(
        pool: &PgPool,
        user_id: &str,
        online: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET is_online = $2, last_seen = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(online)
        .execute(pool)
        .await?;

        Ok(())
    }
}
