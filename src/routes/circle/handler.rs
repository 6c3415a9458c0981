use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::utils::{Claims, error_codes, error_to_api_response, success_to_api_response};

use super::model::{
    Circle, CircleInfo, CreateCircleRequest, JoinCircleRequest, JoinCircleResponse, JoinOutcome,
    UpdateSettingsRequest,
};

#[derive(Debug, Deserialize)]
pub struct CircleIdQuery {
    pub circle_id: String,
}

#[axum::debug_handler]
pub async fn create_circle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCircleRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "圈子名称不能为空".to_string()),
        );
    }

    match Circle::create(&state.pool, req, &claims.sub, state.config.invite_code_length).await {
        Ok(circle) => (
            StatusCode::CREATED,
            success_to_api_response(CircleInfo::from(circle)),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 按邀请码加入。NotFound / AlreadyMember 是上报给调用方的结果，
/// 不走错误响应路径。
#[axum::debug_handler]
pub async fn join_circle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinCircleRequest>,
) -> impl IntoResponse {
    match Circle::join_by_code(&state.pool, &state.redis, &req.invite_code, &claims.sub).await {
        Ok(JoinOutcome::Joined(circle)) => (
            StatusCode::OK,
            success_to_api_response(JoinCircleResponse {
                accepted: true,
                reason: None,
                circle: Some(CircleInfo::from(circle)),
            }),
        ),
        Ok(JoinOutcome::NotFound) => (
            StatusCode::OK,
            success_to_api_response(JoinCircleResponse {
                accepted: false,
                reason: Some("NotFound".to_string()),
                circle: None,
            }),
        ),
        Ok(JoinOutcome::AlreadyMember) => (
            StatusCode::OK,
            success_to_api_response(JoinCircleResponse {
                accepted: false,
                reason: Some("AlreadyMember".to_string()),
                circle: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn leave_circle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CircleIdQuery>,
) -> impl IntoResponse {
    match Circle::leave(&state.pool, &state.redis, &req.circle_id, &claims.sub).await {
        Ok(()) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({ "success": true })),
        ),
        Err(AppError::NotFound) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "用户不在该圈子中".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn my_circles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match Circle::circles_for_user(&state.pool, &claims.sub).await {
        Ok(circles) => {
            let infos = circles.into_iter().map(CircleInfo::from).collect::<Vec<_>>();
            (StatusCode::OK, success_to_api_response(infos))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CircleIdQuery>,
) -> impl IntoResponse {
    // 只有成员能看成员列表
    match Circle::is_member(&state.pool, &query.circle_id, &claims.sub).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::FORBIDDEN,
                error_to_api_response(
                    error_codes::PERMISSION_DENIED,
                    "用户不在该圈子中".to_string(),
                ),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(e.code(), e.to_string()),
            );
        }
    }

    match Circle::members(&state.pool, &query.circle_id).await {
        Ok(members) => (StatusCode::OK, success_to_api_response(members)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    match Circle::update_settings(
        &state.pool,
        &state.redis,
        &req.circle_id,
        &claims.sub,
        &req.settings,
    )
    .await
    {
        Ok(circle) => (
            StatusCode::OK,
            success_to_api_response(CircleInfo::from(circle)),
        ),
        Err(AppError::NotFound) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(
                error_codes::NOT_FOUND,
                "圈子不存在或没有操作权限".to_string(),
            ),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}
