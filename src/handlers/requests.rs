//! 请求视图的 HTTP 处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{error::AppError, middleware::AppState, models::Request, services::RequestView};

/// 最新顶层请求
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let console = state.console.read().await;
    let requests: Vec<&Request> = console.request_index.iter().collect();

    Ok(Json(json!({
        "requests": requests,
        "count": requests.len(),
    })))
}

/// 获取请求视图
///
/// 已跟踪时直接返回；否则从上游拉取并开始跟踪。
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(view) = state.console.read().await.requests.get(&id) {
        return Ok(Json(view.clone()));
    }

    let upstream = state.upstream.as_ref().ok_or(AppError::NotFound)?;
    let request = upstream.get_request(&id).await?;

    state.dispatcher.track_request(request.clone()).await?;
    tracing::info!(request_id = %id, "Started tracking request");

    Ok(Json(RequestView::seeded(request)))
}

/// 停止跟踪请求视图
pub async fn untrack_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.console.read().await.requests.contains(&id) {
        return Err(AppError::NotFound);
    }

    state.dispatcher.untrack_request(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
