//! 权限与角色的 HTTP 处理器
//! 供页面判断按钮/操作是否可见，以及角色编辑器的作用域校验

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppError,
    middleware::AppState,
    models::{Role, ScopeQuery, User},
    services::role_service,
};

/// 权限检查请求
#[derive(Debug, Deserialize)]
pub struct PermissionCheckRequest {
    pub user: User,
    /// 权限级别名称，例如 "OPERATOR"
    pub permission: String,
    #[serde(default)]
    pub scope: ScopeQuery,
    #[serde(default)]
    pub global: bool,
}

/// 角色汇总请求
#[derive(Debug, Deserialize)]
pub struct CoalesceRequest {
    pub roles: Vec<Role>,
}

/// 检查用户权限
pub async fn check_permission(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PermissionCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let allowed = state.permission_service.has_permission_str(
        &req.user,
        &req.permission,
        &req.scope,
        req.global,
    );

    tracing::debug!(
        username = %req.user.username,
        permission = %req.permission,
        global = req.global,
        allowed,
        "Permission checked"
    );

    Ok(Json(json!({
        "allowed": allowed,
        "permission": req.permission,
        "global": req.global,
    })))
}

/// 汇总角色名与权限字符串
pub async fn coalesce_permissions(
    Json(req): Json<CoalesceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let coalesced = role_service::coalesce_permissions(&req.roles)?;
    Ok(Json(coalesced))
}

/// 校验角色定义
///
/// 花园快照已加载时，同时检查作用域条目是否存在于花园树。
pub async fn validate_role(
    State(state): State<Arc<AppState>>,
    Json(role): Json<Role>,
) -> Result<impl IntoResponse, AppError> {
    let tree = {
        let console = state.console.read().await;
        if console.snapshot_loaded {
            console.gardens.tree()?
        } else {
            None
        }
    };

    let report = role_service::validate_role(&role, tree.as_ref())?;
    Ok(Json(report))
}
