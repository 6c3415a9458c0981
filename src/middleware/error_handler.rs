use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};

// 日志里保留的错误响应体上限
const MAX_LOGGED_BODY: usize = 1024;

/// 服务端错误日志中间件：5xx 响应连同响应体一起记录后原样放行
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;
    if !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("读取错误响应体失败: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    tracing::error!(
        "{} {} 返回 {}: {}",
        method,
        uri,
        parts.status,
        String::from_utf8_lossy(&bytes)
    );

    // 响应体已被消费，去掉长度头重新组装
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
