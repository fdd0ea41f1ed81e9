//! 花园查询的 HTTP 处理器

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{error::AppError, middleware::AppState};

/// 列出已知花园（扁平列表）
pub async fn list_gardens(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let console = state.console.read().await;
    if !console.snapshot_loaded {
        return Err(AppError::NotReady);
    }

    let gardens = console.gardens.gardens();
    Ok(Json(json!({
        "gardens": gardens,
        "count": gardens.len(),
        "refresh_pending": console.gardens.refresh_pending(),
    })))
}

/// 以本地花园为根的嵌套树
pub async fn garden_tree(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let console = state.console.read().await;
    if !console.snapshot_loaded {
        return Err(AppError::NotReady);
    }

    let tree = console.gardens.tree()?.ok_or(AppError::NotFound)?;
    Ok(Json(tree))
}

/// 获取单个花园
pub async fn get_garden(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let console = state.console.read().await;
    let garden = console.gardens.find(&name).cloned().ok_or(AppError::NotFound)?;
    Ok(Json(garden))
}
