use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{AppState, error::AppError, utils::verify_token};

/// 认证中间件：校验 Bearer token 并把 Claims 放进请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let claims = verify_token(token, &state.config)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
