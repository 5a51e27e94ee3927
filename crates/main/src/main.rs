//! 主应用程序入口
//!
//! 装配配置、数据库、应用服务与 TCP 监听，并处理优雅关停。

use std::sync::Arc;

use application::{
    AuthService, AuthServiceDependencies, ChatMessagingService, ChatMessagingServiceDependencies,
    SystemClock,
};
use config::AppConfig;
use infrastructure::db::{self, PgStorage};
use infrastructure::password::Pbkdf2PasswordHasher;
use tcp_server::{ChatServer, ClientRegistry, ServerDependencies};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        env = %config.app.env,
        host = %config.server.host,
        port = config.server.port,
        "正在启动聊天服务器..."
    );

    let pool = db::create_pg_pool(
        &config.database.url,
        config.database.username.as_deref(),
        config.database.password.as_deref(),
        config.database.max_connections,
    )
    .await?;

    db::ping(&pool)
        .await
        .map_err(|err| anyhow::anyhow!("数据库连通性检查失败: {err}"))?;
    tracing::info!("数据库连通性检查通过");

    if config.should_init_schema() {
        db::initialize_schema(&pool).await?;
        tracing::info!("数据库模式初始化完成");
    }

    let storage = PgStorage::new(pool);
    let clock = Arc::new(SystemClock);
    let password_hasher = Arc::new(Pbkdf2PasswordHasher::default());

    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        user_repository: storage.user_repository.clone(),
        password_hasher: password_hasher.clone(),
        clock: clock.clone(),
    }));

    let chat_service = Arc::new(ChatMessagingService::new(ChatMessagingServiceDependencies {
        user_repository: storage.user_repository.clone(),
        room_repository: storage.room_repository.clone(),
        direct_chat_repository: storage.direct_chat_repository.clone(),
        message_repository: storage.message_repository.clone(),
        clock,
    }));

    if config.is_dev() {
        infrastructure::seed::seed_dev_data(&auth_service, &chat_service).await;
    }

    let registry = Arc::new(ClientRegistry::new());
    let server = ChatServer::bind(
        &config.server.host,
        config.server.port,
        ServerDependencies {
            auth_service,
            chat_service,
            registry,
        },
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("收到 Ctrl-C，开始关停");
            let _ = shutdown_tx.send(true);
        }
    });

    server.serve(shutdown_rx).await;
    tracing::info!("服务器已停止");
    Ok(())
}
