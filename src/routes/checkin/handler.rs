use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::AppState;
use crate::core::gate::Location;
use crate::routes::circle::Circle;
use crate::utils::{Claims, error_codes, error_to_api_response, success_to_api_response};

use super::model::{CheckIn, CreateCheckInRequest, GetCheckInsRequest};

const DEFAULT_CHECK_IN_LIMIT: i64 = 50;

#[axum::debug_handler]
pub async fn create_check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCheckInRequest>,
) -> impl IntoResponse {
    match Circle::is_member(&state.pool, &req.circle_id, &claims.sub).await {
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

    // 附带采样直接用，否则退回最后一次已知位置
    let location = match &req.sample {
        Some(sample) => Location::from_sample(sample, Utc::now()),
        None => {
            match CheckIn::last_known_location(&state.pool, &req.circle_id, &claims.sub).await {
                Ok(Some(location)) => location,
                Ok(None) => {
                    return (
                        StatusCode::OK,
                        error_to_api_response(
                            error_codes::VALIDATION_ERROR,
                            "没有可用位置，请附带定位采样".to_string(),
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
        }
    };

    match CheckIn::create(
        &state.pool,
        &state.redis,
        &req.circle_id,
        &claims.sub,
        req.kind,
        req.message,
        &location,
    )
    .await
    {
        Ok(check_in) => (StatusCode::CREATED, success_to_api_response(check_in)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_check_ins(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(req): Query<GetCheckInsRequest>,
) -> impl IntoResponse {
    match Circle::is_member(&state.pool, &req.circle_id, &claims.sub).await {
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

    let limit = req.limit.unwrap_or(DEFAULT_CHECK_IN_LIMIT).clamp(1, 200);
    match CheckIn::find_by_circle(&state.pool, &req.circle_id, limit).await {
        Ok(check_ins) => (StatusCode::OK, success_to_api_response(check_ins)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}
