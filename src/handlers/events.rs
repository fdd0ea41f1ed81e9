//! 实时事件流（SSE）处理器

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::{error::AppError, middleware::AppState};

#[derive(Debug, Deserialize)]
pub struct EventStreamQuery {
    /// 只接收与该请求视图相关的请求事件
    pub request_id: Option<String>,
}

/// 订阅控制台事件流
pub async fn subscribe_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventStreamQuery>,
) -> Result<Response, AppError> {
    let heartbeat = Duration::from_secs(state.config.realtime.heartbeat_secs.max(1));
    let stream = state
        .event_bus
        .subscribe_stream(query.request_id)
        .to_sse_stream(heartbeat);

    let body = axum::body::Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no") // 禁用nginx缓冲
        .body(body)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create SSE response");
            AppError::Internal
        })
}
