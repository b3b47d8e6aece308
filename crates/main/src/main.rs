//! 主应用程序入口
//!
//! 加载配置、连接数据库并启动 Axum Web API 服务。

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use application::{
    spawn_retention_cleanup, spawn_session_sweeper, BroadcastHub, ChatContext, ChatService,
    ChatServiceDependencies, ChatSettings, Clock, PresenceRegistry, SessionStore,
    SharedContentFilter, SystemClock, UserService, UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，RUST_LOG 未设置时默认 info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let infra = Infrastructure::connect(&config.database, &config.security)
        .await
        .context("failed to initialise database")?;
    let storage = infra.storage.clone();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = Arc::new(SessionStore::new(
        clock.clone(),
        chrono::Duration::seconds(config.session.idle_timeout_secs as i64),
    ));
    let hub = Arc::new(BroadcastHub::new(
        Arc::new(PresenceRegistry::new()),
        clock.clone(),
    ));
    let content_filter = Arc::new(SharedContentFilter::from_config(&config.filter));

    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        user_repository: Arc::new(storage.user_repository.clone()),
        password_hasher: infra.password_hasher.clone(),
        clock: clock.clone(),
        sessions: sessions.clone(),
    }));
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        message_repository: Arc::new(storage.message_repository.clone()),
        block_repository: Arc::new(storage.block_repository.clone()),
        user_repository: Arc::new(storage.user_repository.clone()),
        filter: content_filter,
        clock: clock.clone(),
        settings: ChatSettings::from_config(&config),
    }));

    let session_sweeper = spawn_session_sweeper(
        sessions.clone(),
        Duration::from_secs(config.session.sweep_interval_secs),
    );
    let retention_cleanup = spawn_retention_cleanup(
        chat_service.clone(),
        Duration::from_secs(config.retention.cleanup_interval_secs),
    );

    let context = Arc::new(ChatContext {
        sessions,
        hub,
        chat: chat_service,
        users: user_service,
        clock,
    });
    let app = router(AppState::new(context));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("聊天室服务器启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session_sweeper.abort();
    retention_cleanup.abort();
    tracing::info!("聊天室服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关闭信号");
}
