//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, middleware::AppState};

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        // 花园
        .route("/api/v1/gardens", get(handlers::gardens::list_gardens))
        .route("/api/v1/gardens/tree", get(handlers::gardens::garden_tree))
        .route("/api/v1/gardens/{name}", get(handlers::gardens::get_garden))

        // 请求
        .route("/api/v1/requests", get(handlers::requests::list_requests))
        .route("/api/v1/requests/{id}", get(handlers::requests::get_request))
        .route(
            "/api/v1/requests/{id}/watch",
            delete(handlers::requests::untrack_request),
        )

        // 权限与角色
        .route(
            "/api/v1/permissions/check",
            post(handlers::permissions::check_permission),
        )
        .route(
            "/api/v1/permissions/coalesce",
            post(handlers::permissions::coalesce_permissions),
        )
        .route("/api/v1/roles/validate", post(handlers::permissions::validate_role))

        // 实时事件流（SSE）
        .route("/api/v1/events", get(handlers::events::subscribe_events));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}
