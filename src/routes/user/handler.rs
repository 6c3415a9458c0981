use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    cache::operations::presence::PresenceCacheOperations,
    cache::operations::session::SessionCacheOperations,
    utils::{
        Claims, error_codes, error_to_api_response, generate_token, success_to_api_response,
        verify_password,
    },
};

use super::model::{
    CheckTokenResponse, LoginRequest, LoginResponse, RegisterRequest, User, UserInfo,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() || !req.email.contains('@') {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "姓名不能为空且邮箱格式必须有效".to_string(),
            ),
        );
    }

    match User::create(&state.pool, req).await {
        Ok(user) => match generate_token(&user.user_id, &state.config) {
            Ok((token, _)) => (
                StatusCode::OK,
                success_to_api_response(LoginResponse {
                    user_id: user.user_id,
                    name: user.name,
                    token,
                }),
            ),
            Err(_) => (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
            ),
        },
        Err(e) => {
            if e.to_string().contains("unique constraint") {
                (
                    StatusCode::OK,
                    error_to_api_response(error_codes::USER_EXISTS, "用户已存在".to_string()),
                )
            } else {
                (
                    StatusCode::OK,
                    error_to_api_response(error_codes::INTERNAL_ERROR, "创建用户失败".to_string()),
                )
            }
        }
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    // 会话状态机：匿名 → 认证中 → 已认证；失败回到匿名并带错误
    let user = match User::find_by_email(&state.pool, &req.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::NOT_FOUND, "用户不存在".to_string()),
            );
        }
        Err(_) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    };

    match verify_password(&req.password, &user.password_hash) {
        Ok(true) => {}
        _ => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "邮箱或密码错误".to_string()),
            );
        }
    }

    let token = match generate_token(&user.user_id, &state.config) {
        Ok((token, _)) => token,
        Err(_) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
            );
        }
    };

    if let Err(e) = User::set_online(&state.pool, &user.user_id, true).await {
        tracing::warn!("更新在线状态失败: {}", e);
    }

    // 缓存会话身份，供客户端启动时恢复；登出时删除
    if let Err(e) = SessionCacheOperations::cache_session(
        &state.redis,
        &user.user_id,
        &user.name,
        state.config.jwt_expiration().as_secs(),
    )
    .await
    {
        tracing::warn!("缓存会话失败: {}", e);
    }

    (
        StatusCode::OK,
        success_to_api_response(LoginResponse {
            user_id: user.user_id,
            name: user.name,
            token,
        }),
    )
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    // 登出顺序：先清订阅方状态（在线标记、会话缓存），再让客户端
    // 丢弃令牌；位置流的取消由 WebSocket 断开时的会话任务负责
    if let Err(e) = User::set_online(&state.pool, &claims.sub, false).await {
        tracing::warn!("更新在线状态失败: {}", e);
    }
    if let Err(e) = SessionCacheOperations::remove_session(&state.redis, &claims.sub).await {
        tracing::warn!("清除会话缓存失败: {}", e);
    }
    if let Err(e) = PresenceCacheOperations::mark_offline(&state.redis, &claims.sub).await {
        tracing::warn!("标记离线失败: {}", e);
    }

    (
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    )
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(user)) => (StatusCode::OK, success_to_api_response(UserInfo::from(user))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "用户不存在".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn check_token(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(CheckTokenResponse {
            user_id: claims.sub,
        }),
    )
}
