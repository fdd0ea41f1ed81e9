//! 测试公共模块
//! 提供测试辅助函数和测试工具

#![allow(dead_code)]

use garden_console::{
    config::{AppConfig, AuthConfig, LoggingConfig, RealtimeConfig, ServerConfig, UpstreamConfig},
    middleware::AppState,
    models::{ConnectionType, Garden, PermissionLevel, Role, System, User},
    realtime::{ConsoleState, Dispatcher, EventBus, PushState},
    services::PermissionService,
};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            graceful_shutdown_timeout_secs: 5,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        upstream: UpstreamConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            events_url: None,
            token: None,
            request_timeout_secs: 1,
            refresh_interval_secs: 60,
        },
        auth: AuthConfig { enabled: true },
        realtime: RealtimeConfig {
            event_bus_capacity: 64,
            dispatcher_queue: 64,
            tracked_request_limit: 8,
            request_index_limit: 50,
            reconnect_initial_ms: 10,
            reconnect_max_ms: 100,
            heartbeat_secs: 30,
        },
    }
}

/// 测试用应用：状态与调度器（不连接上游）
pub struct TestApp {
    pub state: Arc<AppState>,
    pub dispatcher: Dispatcher,
    pub push_tx: watch::Sender<PushState>,
}

/// 创建测试应用状态；调度器由测试自行驱动
pub fn create_test_app() -> TestApp {
    let config = create_test_config();
    let event_bus = EventBus::new(config.realtime.event_bus_capacity);
    let console = Arc::new(RwLock::new(ConsoleState::new(&config.realtime)));
    let dispatcher = Dispatcher::new(
        console.clone(),
        event_bus.clone(),
        None,
        config.realtime.dispatcher_queue,
    );
    let (push_tx, push_state) = watch::channel(PushState::Disconnected);

    let state = Arc::new(AppState {
        permission_service: Arc::new(PermissionService::from_config(&config.auth)),
        config,
        console,
        dispatcher: dispatcher.handle(),
        upstream: None,
        event_bus: Arc::new(event_bus),
        push_state,
    });

    TestApp {
        state,
        dispatcher,
        push_tx,
    }
}

/// 本地花园 + 一个远程花园，各带一个系统
pub fn sample_gardens() -> Vec<Garden> {
    vec![
        Garden::new("local", ConnectionType::Local).with_system(
            System::new("default", "echo", "3.0.0")
                .with_instance("default")
                .with_command("say"),
        ),
        Garden::new("remote", ConnectionType::Http)
            .with_parent("local")
            .with_system(System::new("ops", "deploy", "1.2.0").with_command("rollout")),
    ]
}

pub fn role(name: &str, level: PermissionLevel) -> Role {
    Role::new(name, level)
}

pub fn user_with_roles(local: Vec<Role>, remote: Vec<Role>) -> User {
    let mut user = User::new("tester");
    user.local_roles = local;
    user.remote_roles = remote;
    user
}

pub fn enabled_service() -> PermissionService {
    PermissionService::new(true)
}
