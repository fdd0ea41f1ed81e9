//! 日志与追踪系统
//! 初始化结构化日志和指标描述

use crate::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 初始化日志与追踪系统
pub fn init_telemetry(config: &AppConfig) {
    // 从环境变量构建过滤器
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // 根据配置选择日志格式
    let log_layer = match config.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.logging.level,
        format = %config.logging.format,
        upstream = %config.upstream.base_url,
        "Telemetry initialized"
    );
}

/// 注册指标描述
///
/// 未安装 recorder 时这些调用为空操作。
pub fn init_metrics() {
    metrics::describe_counter!(
        "console_events_applied_total",
        "Push events applied to console state, by kind"
    );
    metrics::describe_counter!(
        "console_events_rejected_total",
        "Push events rejected at the boundary, by reason"
    );
    metrics::describe_counter!(
        "console_refresh_total",
        "Garden snapshot refreshes, by outcome"
    );
    metrics::describe_counter!("push_reconnects_total", "Push channel reconnect attempts");
    metrics::describe_counter!("http_requests_total", "HTTP requests served, by method and status");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds"
    );
    tracing::debug!("Metrics initialized");
}
