//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3000"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// beer-garden REST 根地址，例如 "http://localhost:2337"
    pub base_url: String,
    /// 推送通道地址；未设置时由 base_url 推导
    pub events_url: Option<String>,
    /// 访问令牌（使用 Secret 包装，防止日志泄露）
    pub token: Option<Secret<String>>,
    /// 单次 REST 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 全量刷新间隔（秒）
    pub refresh_interval_secs: u64,
}

impl UpstreamConfig {
    /// 推送通道的 WebSocket 地址
    pub fn events_url(&self) -> String {
        if let Some(url) = &self.events_url {
            return url.clone();
        }

        let base = self.base_url.trim_end_matches('/');
        let base = match base.strip_prefix("https://") {
            Some(rest) => format!("wss://{}", rest),
            None => match base.strip_prefix("http://") {
                Some(rest) => format!("ws://{}", rest),
                None => base.to_string(),
            },
        };
        format!("{}/api/v1/socket/events/", base)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// 关闭时所有权限检查直接通过
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// SSE 事件总线容量
    pub event_bus_capacity: usize,
    /// 调度器消息队列容量
    pub dispatcher_queue: usize,
    /// 同时跟踪的请求视图上限
    pub tracked_request_limit: usize,
    /// 请求索引保留条数
    pub request_index_limit: usize,
    /// 推送通道重连初始退避（毫秒）
    pub reconnect_initial_ms: u64,
    /// 推送通道重连最大退避（毫秒）
    pub reconnect_max_ms: u64,
    /// SSE 心跳间隔（秒）
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("upstream.base_url", "http://localhost:2337")?
            .set_default("upstream.request_timeout_secs", 10)?
            .set_default("upstream.refresh_interval_secs", 300)?
            .set_default("auth.enabled", true)?
            .set_default("realtime.event_bus_capacity", 1000)?
            .set_default("realtime.dispatcher_queue", 1024)?
            .set_default("realtime.tracked_request_limit", 64)?
            .set_default("realtime.request_index_limit", 200)?
            .set_default("realtime.reconnect_initial_ms", 500)?
            .set_default("realtime.reconnect_max_ms", 30000)?
            .set_default("realtime.heartbeat_secs", 30)?;

        // 从环境变量加载配置（前缀为 BG_）
        settings = settings.add_source(
            Environment::with_prefix("BG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证上游地址
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(format!(
                "Invalid upstream base_url: {}. Must start with http:// or https://",
                self.upstream.base_url
            )));
        }

        if let Some(url) = &self.upstream.events_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(ConfigError::Message(format!(
                    "Invalid upstream events_url: {}. Must start with ws:// or wss://",
                    url
                )));
            }
        }

        if self.upstream.request_timeout_secs == 0 || self.upstream.refresh_interval_secs == 0 {
            return Err(ConfigError::Message(
                "request_timeout_secs and refresh_interval_secs must be > 0".to_string(),
            ));
        }

        // 验证重连退避
        if self.realtime.reconnect_initial_ms == 0
            || self.realtime.reconnect_initial_ms > self.realtime.reconnect_max_ms
        {
            return Err(ConfigError::Message(
                "reconnect_initial_ms must be > 0 and <= reconnect_max_ms".to_string(),
            ));
        }

        if self.realtime.event_bus_capacity == 0 || self.realtime.dispatcher_queue == 0 {
            return Err(ConfigError::Message(
                "event_bus_capacity and dispatcher_queue must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "BG_SERVER__ADDR",
            "BG_LOGGING__LEVEL",
            "BG_UPSTREAM__BASE_URL",
            "BG_UPSTREAM__EVENTS_URL",
            "BG_UPSTREAM__TOKEN",
            "BG_AUTH__ENABLED",
            "BG_REALTIME__RECONNECT_INITIAL_MS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert_eq!(config.logging.level, "info");
        assert!(config.auth.enabled);
        assert!(config.upstream.token.is_none());
        assert_eq!(
            config.upstream.events_url(),
            "ws://localhost:2337/api/v1/socket/events/"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        std::env::set_var("BG_UPSTREAM__BASE_URL", "https://garden.example.com/");
        std::env::set_var("BG_UPSTREAM__TOKEN", "abc123");
        std::env::set_var("BG_AUTH__ENABLED", "false");

        let config = AppConfig::from_env().unwrap();
        assert!(!config.auth.enabled);
        assert_eq!(
            config.upstream.token.as_ref().map(|t| t.expose_secret().clone()),
            Some("abc123".to_string())
        );
        assert_eq!(
            config.upstream.events_url(),
            "wss://garden.example.com/api/v1/socket/events/"
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_port() {
        clear_env();
        std::env::set_var("BG_SERVER__ADDR", "0.0.0.0:80");

        let result = AppConfig::from_env();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_log_level() {
        clear_env();
        std::env::set_var("BG_LOGGING__LEVEL", "invalid");

        let result = AppConfig::from_env();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_backoff() {
        clear_env();
        std::env::set_var("BG_REALTIME__RECONNECT_INITIAL_MS", "60000");

        let result = AppConfig::from_env();
        assert!(result.is_err());

        clear_env();
    }
}
