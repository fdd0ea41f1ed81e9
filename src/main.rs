//! 花园控制台主入口

use garden_console::{
    config::AppConfig,
    handlers::health,
    middleware::AppState,
    realtime::{ConsoleState, Dispatcher, DispatcherHandle, EventBus, PushChannel},
    routes,
    services::PermissionService,
    telemetry,
    upstream::UpstreamClient,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{watch, RwLock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("garden-console {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env.development > .env
    if let Ok(env) = std::env::var("BG_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志与指标
    telemetry::init_telemetry(&config);
    telemetry::init_metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Garden console starting...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 3. 控制台状态与调度器
    let event_bus = Arc::new(EventBus::new(config.realtime.event_bus_capacity));
    let console = Arc::new(RwLock::new(ConsoleState::new(&config.realtime)));
    let upstream = UpstreamClient::new(&config.upstream)?;

    let dispatcher = Dispatcher::new(
        console.clone(),
        event_bus.as_ref().clone(),
        Some(upstream.clone()),
        config.realtime.dispatcher_queue,
    );
    let dispatcher_handle = dispatcher.handle();
    tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    // 4. 推送通道与周期刷新
    let push_state = PushChannel::new(&config, event_bus.as_ref().clone())
        .start(dispatcher_handle.clone(), shutdown_rx.clone());

    tokio::spawn(refresh_timer(
        dispatcher_handle.clone(),
        Duration::from_secs(config.upstream.refresh_interval_secs),
        shutdown_rx.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        console,
        dispatcher: dispatcher_handle,
        permission_service: Arc::new(PermissionService::from_config(&config.auth)),
        upstream: Some(upstream),
        event_bus,
        push_state,
    });

    // 5. 构建路由
    let app = routes::create_router(app_state);

    // 6. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        upstream = %config.upstream.base_url,
        auth_enabled = config.auth.enabled,
        "Server listening"
    );

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // 7. 优雅关闭（SSE 长连接可能拖住关闭，超时后强制退出）
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()))
        .into_future();
    let timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);

    tokio::select! {
        result = server => result?,
        _ = async {
            wait_for_shutdown(shutdown_rx.clone()).await;
            tokio::time::sleep(timeout).await;
        } => {
            tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 周期性全量刷新；首次 tick 立即触发，用于初始化
async fn refresh_timer(
    dispatcher: DispatcherHandle,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = interval.tick() => {
                if dispatcher.request_refresh().await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("garden-console {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: garden-console [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 BG_ 前缀的环境变量完成，例如:");
    println!("  BG_UPSTREAM__BASE_URL=http://localhost:2337");
    println!("  BG_UPSTREAM__TOKEN=<token>");
    println!("  BG_AUTH__ENABLED=true");
}
