use std::sync::Arc;

use valentine_backend::features::card::{CardStorage, spawn_expiry_sweeper};
use valentine_backend::features::moderation::blocklist;
use valentine_backend::startup::{content_loader, run_startup_checks};
use valentine_backend::state::AppState;
use valentine_backend::{ShutdownManager, app::build_app, config::AppConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "valentine_backend=info,tower_http=info".into()),
        )
        .init();

    let shutdown_manager = ShutdownManager::new();

    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_startup_checks(config).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // 内容库与屏蔽词：启动后只读
    let content_dir = config.content_path();
    let library = content_loader::load_content_library(&content_dir, &config.content)
        .unwrap_or_else(|e| {
            tracing::error!("内容库加载失败: {}", e);
            std::process::exit(1);
        });
    let blocklist_path = content_dir.join(&config.content.blocklist_file);
    match content_loader::load_blocklist(&blocklist_path) {
        Ok(list) => {
            if let Err(e) = blocklist::init_global(list) {
                tracing::warn!("屏蔽词表初始化失败: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("屏蔽词表加载失败: {}", e);
            std::process::exit(1);
        }
    }

    let storage = match CardStorage::connect_sqlite(
        &config.storage.sqlite_path,
        config.storage.sqlite_wal,
    )
    .await
    {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("数据库连接失败: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = storage.init_schema().await {
        tracing::error!("数据库初始化失败: {}", e);
        std::process::exit(1);
    }

    let sweeper = config.cards.sweep_interval().map(|period| {
        spawn_expiry_sweeper(Arc::clone(&storage), period, shutdown_manager.handle())
    });

    let app_state = AppState {
        library: Arc::new(library),
        storage: Arc::clone(&storage),
        cards: Arc::new(config.cards.clone()),
    };
    let app = build_app(app_state, config);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Cards API: http://{}{}/cards", addr, config.api.prefix);
    tracing::info!("Content API: http://{}{}/texts", addr, config.api.prefix);
    tracing::info!("Illustrations: {:?}", config.public_path().join("illustrations"));

    let shutdown_config = &config.shutdown;
    let cleanup = shutdown_manager.handle();
    let waiter = shutdown_manager.clone();
    let shutdown_signal = async move {
        let reason = waiter.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    // HTTP 服务停止后收尾：等后台清理任务退出，再关闭连接池
    tracing::info!("优雅退出超时时间: {}秒", shutdown_config.timeout_secs);
    let finished = cleanup
        .cleanup_with_timeout(
            async {
                if let Some(task) = sweeper
                    && let Err(e) = task.await
                {
                    tracing::warn!("过期清理任务异常结束: {}", e);
                }
                storage.close().await;
            },
            shutdown_config.timeout_duration(),
        )
        .await;

    match finished {
        Ok(()) => tracing::info!("服务器已优雅关闭"),
        Err(_) => {
            tracing::warn!("优雅退出超时，强制退出");
            if shutdown_config.force_quit {
                tokio::time::sleep(shutdown_config.force_delay_duration()).await;
            }
            std::process::exit(1);
        }
    }
}
