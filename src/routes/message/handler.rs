use std::convert::Infallible;

use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::broadcast;

use super::model::{CreateMessageRequest, GetMessagesRequest, MessageWithNickname};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::routes::group::Group;
use crate::utils::{Claims, success_to_api_response};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub group_id: String,
}

#[axum::debug_handler]
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> AppResult<impl IntoResponse> {
    if req.content.is_empty() || req.content.len() > 2000 {
        return Err(AppError::Validation("消息长度必须在1到2000个字符之间".into()));
    }

    let message =
        MessageWithNickname::create(&state.pool, &state.redis, req, &claims.sub).await?;

    // 推给当前在线的订阅者
    state.events.publish(message.into());

    Ok((
        StatusCode::CREATED,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}

#[axum::debug_handler]
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GetMessagesRequest>,
) -> AppResult<impl IntoResponse> {
    let messages =
        MessageWithNickname::get_messages(&state.pool, &state.redis, req, &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(messages)))
}

/// 群组动态的SSE订阅。连接即订阅、断开即取消；
/// 重连得到一条全新的流，不回放历史。
#[axum::debug_handler]
pub async fn stream_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !Group::is_member(&state.pool, &query.group_id, &claims.sub).await? {
        return Err(AppError::PermissionDenied);
    }

    let rx = state.events.subscribe(&query.group_id);
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse_event = Event::default().event("message").json_data(&event).ok()?;
                    return Some((Ok::<_, Infallible>(sse_event), rx));
                }
                // 慢消费者被挤掉了若干条，继续收剩下的
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
