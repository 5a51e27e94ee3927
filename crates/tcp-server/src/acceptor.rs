//! TCP 监听与连接分发。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use application::{AuthService, ChatMessagingService};

use crate::connection::ConnectionHandler;
use crate::registry::ClientRegistry;

/// 所有连接共享的服务依赖。
#[derive(Clone)]
pub struct ServerDependencies {
    pub auth_service: Arc<AuthService>,
    pub chat_service: Arc<ChatMessagingService>,
    pub registry: Arc<ClientRegistry>,
}

pub struct ChatServer {
    listener: TcpListener,
    deps: ServerDependencies,
    client_seq: AtomicU64,
}

impl ChatServer {
    /// 绑定监听地址；port 传 0 时由系统分配（测试用）。
    pub async fn bind(host: &str, port: u16, deps: ServerDependencies) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        info!(addr = %listener.local_addr()?, "聊天服务器开始监听");

        Ok(Self {
            listener,
            deps,
            client_seq: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 接收循环：为每个连接分配单调递增的 client_id，配置 TCP_NODELAY，
    /// 然后交给独立的处理器任务。关停信号关闭监听；既有连接由各自的
    /// 处理器感知同一信号结束。
    pub async fn serve(self, shutdown: watch::Receiver<bool>) {
        let mut accept_shutdown = shutdown.clone();
        loop {
            let accepted = tokio::select! {
                _ = accept_shutdown.changed() => {
                    info!("收到关停信号，停止接收新连接");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, remote) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "接受客户端连接失败");
                    continue;
                }
            };

            if let Err(err) = stream.set_nodelay(true) {
                warn!(remote = %remote, error = %err, "设置 TCP_NODELAY 失败");
            }

            let client_id = self.client_seq.fetch_add(1, Ordering::Relaxed);
            info!(client_id, remote = %remote, "客户端已连接");

            let deps = self.deps.clone();
            let handler_shutdown = shutdown.clone();
            tokio::spawn(async move {
                ConnectionHandler::run(
                    client_id,
                    stream,
                    deps.registry,
                    deps.auth_service,
                    deps.chat_service,
                    handler_shutdown,
                )
                .await;
            });
        }
        // listener 随 self 一起 drop，监听 socket 关闭
    }
}
