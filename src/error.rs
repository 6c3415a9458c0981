use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

use crate::utils::error_codes;

/// 核心错误种类。任何一种都只降级单个功能，不会让会话崩溃。
#[derive(Debug)]
pub enum AppError {
    /// 设备拒绝定位权限，位置共享被关闭
    PermissionDenied,
    /// 邀请码或记录不存在
    NotFound,
    /// 用户已经在圈子成员集合里（可报告的结果，不是重试条件）
    AlreadyMember,
    /// 未登录时执行需要登录的操作
    Unauthenticated,
    /// 数据库或缓存不可用
    BackendUnavailable(String),
    /// 请求参数不合法
    Validation(String),
    /// 其余内部错误
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::PermissionDenied => write!(f, "定位权限被拒绝"),
            AppError::NotFound => write!(f, "记录不存在"),
            AppError::AlreadyMember => write!(f, "用户已在圈子中"),
            AppError::Unauthenticated => write!(f, "未授权访问"),
            AppError::BackendUnavailable(msg) => write!(f, "后端服务不可用: {}", msg),
            AppError::Validation(msg) => write!(f, "参数无效: {}", msg),
            AppError::Internal(msg) => write!(f, "内部服务器错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn code(&self) -> i32 {
        match self {
            AppError::PermissionDenied => error_codes::PERMISSION_DENIED,
            AppError::NotFound => error_codes::NOT_FOUND,
            AppError::AlreadyMember => error_codes::ALREADY_MEMBER,
            AppError::Unauthenticated => error_codes::AUTH_FAILED,
            AppError::BackendUnavailable(_) => error_codes::BACKEND_UNAVAILABLE,
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::AlreadyMember => StatusCode::OK,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: i32,
    msg: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            code: self.code(),
            msg: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::BackendUnavailable(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthenticated
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("密码哈希失败: {}", e))
    }
}
