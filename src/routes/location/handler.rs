use std::sync::Arc;

use axum::{
    extract::{
        Extension, Json, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::AppState;
use crate::cache::operations::events::{CircleEvent, EventOperations};
use crate::core::gate::{Location, RawSample};
use crate::core::session::{LocationSink, SessionCommand, SessionConfig, SessionHandle};
use crate::core::store::SessionUser;
use crate::error::AppError;
use crate::routes::circle::Circle;
use crate::routes::user::User;
use crate::utils::{Claims, error_codes, error_to_api_response, success_to_api_response, verify_token};

use super::model::{
    ClientMessage, PersistingSink, StoredUserLocation, UpdateLocationResponse,
    acquire_min_interval, sharing_circle_ids,
};

#[derive(Debug, Deserialize)]
pub struct CircleIdQuery {
    pub circle_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// 浏览器 WebSocket 不能带自定义头，令牌走查询参数
    pub token: String,
}

/// 无会话的单次位置上报。只做最小间隔检查（5 秒），去抖合并
/// 属于有状态的流式路径。
#[axum::debug_handler]
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(sample): Json<RawSample>,
) -> impl IntoResponse {
    if !(-90.0..=90.0).contains(&sample.latitude)
        || !(-180.0..=180.0).contains(&sample.longitude)
    {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "经纬度超出范围".to_string()),
        );
    }

    match acquire_min_interval(
        &state.redis,
        &claims.sub,
        state.config.location_min_interval_secs,
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => {
            // 间隔未到不是错误，报告未接受即可
            return (
                StatusCode::OK,
                success_to_api_response(UpdateLocationResponse {
                    accepted: false,
                    location: None,
                }),
            );
        }
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                error_to_api_response(e.code(), e.to_string()),
            );
        }
    }

    let location = Location::from_sample(&sample, Utc::now());
    let circle_ids = match sharing_circle_ids(&state.pool, &claims.sub).await {
        Ok(ids) => ids,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(e.code(), e.to_string()),
            );
        }
    };

    let sink = PersistingSink::new(state.pool.clone(), state.redis.clone(), circle_ids);
    if let Err(e) = sink.deliver(&claims.sub, &location).await {
        // 丢一条采样可以接受，下一条自然重试
        tracing::warn!("丢弃位置更新（用户 {}）: {}", claims.sub, e);
    }

    (
        StatusCode::OK,
        success_to_api_response(UpdateLocationResponse {
            accepted: true,
            location: Some(location),
        }),
    )
}

#[axum::debug_handler]
pub async fn get_circle_locations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CircleIdQuery>,
) -> impl IntoResponse {
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

    match StoredUserLocation::find_by_circle(&state.pool, &query.circle_id).await {
        Ok(locations) => (StatusCode::OK, success_to_api_response(locations)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(e.code(), e.to_string()),
        ),
    }
}

/// 位置流：设备沿 WebSocket 上报采样，服务端用会话任务做
/// 去抖 + 限频 + 分类，并把圈子成员的位置/打卡事件推回设备。
#[axum::debug_handler]
pub async fn location_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match verify_token(&query.token, &state.config) {
        Ok(claims) => claims,
        Err(_) => return AppError::Unauthenticated.into_response(),
    };

    ws.on_upgrade(move |socket| handle_stream(state, socket, claims.sub))
}

async fn handle_stream(state: AppState, socket: WebSocket, user_id: String) {
    let user = match User::find_by_id(&state.pool, &user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("位置流拒绝未知用户 {}", user_id);
            return;
        }
        Err(e) => {
            tracing::error!("加载用户失败: {}", e);
            return;
        }
    };

    let member_circles = match Circle::ids_for_user(&state.pool, &user_id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("加载圈子失败: {}", e);
            return;
        }
    };
    let sharing_circles = match sharing_circle_ids(&state.pool, &user_id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("加载共享圈子失败: {}", e);
            return;
        }
    };

    // 订阅所有成员圈子的事件频道
    let events = match EventOperations::subscribe(&state.redis, &member_circles).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("订阅圈子频道失败: {}", e);
            return;
        }
    };
    let mut events = std::pin::pin!(events);

    let sink = Arc::new(PersistingSink::new(
        state.pool.clone(),
        state.redis.clone(),
        sharing_circles,
    ));
    let session = SessionHandle::spawn(
        SessionUser {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
        },
        member_circles,
        SessionConfig {
            min_interval: state.config.location_min_interval(),
            debounce: state.config.location_debounce(),
        },
        sink,
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Sample { latitude, longitude, accuracy, speed, heading }) => {
                                session.send(SessionCommand::Sample(RawSample {
                                    latitude,
                                    longitude,
                                    accuracy,
                                    speed,
                                    heading,
                                })).await;
                            }
                            Ok(ClientMessage::PermissionDenied) => {
                                session.send(SessionCommand::PermissionDenied).await;
                            }
                            Ok(ClientMessage::ToggleSharing) => {
                                session.send(SessionCommand::ToggleSharing).await;
                            }
                            Err(e) => {
                                tracing::debug!("忽略无法解析的消息: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("位置流读取错误: {}", e);
                        break;
                    }
                }
            }
            event = events.next() => {
                let Some(msg) = event else { break };
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::debug!("读取事件负载失败: {}", e);
                        continue;
                    }
                };
                // 自己的更新不用回显，其他成员的位置进会话状态
                if let Ok(CircleEvent::Location(update)) = serde_json::from_str(&payload) {
                    if update.user_id == user_id {
                        continue;
                    }
                    session.send(SessionCommand::RemoteUpdate(update)).await;
                }
                if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // 断开即登出本会话：先停掉会话任务（取消未触发的去抖定时器），
    // 订阅流随之丢弃，不会再有回调写入
    session.shutdown().await;
}
