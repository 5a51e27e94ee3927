//! 集成测试支撑：在随机端口上拉起真实的 TCP 服务器，存储用内存实现。

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::{
    AuthService, AuthServiceDependencies, ChatMessagingService, ChatMessagingServiceDependencies,
    SystemClock,
};
use infrastructure::memory::InMemoryStorage;
use infrastructure::password::Pbkdf2PasswordHasher;
use serde_json::{json, Value};
use tcp_server::{ChatServer, ClientRegistry, ServerDependencies};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: std::net::SocketAddr,
    /// 存储观察口，断言持久化副作用用
    pub storage: InMemoryStorage,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let storage = InMemoryStorage::new();
        let clock = Arc::new(SystemClock);

        let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
            user_repository: storage.user_repository(),
            // 低迭代次数，让认证相关用例跑得快
            password_hasher: Arc::new(Pbkdf2PasswordHasher::new(Some(1_000))),
            clock: clock.clone(),
        }));

        let chat_service = Arc::new(ChatMessagingService::new(ChatMessagingServiceDependencies {
            user_repository: storage.user_repository(),
            room_repository: storage.room_repository(),
            direct_chat_repository: storage.direct_chat_repository(),
            message_repository: storage.message_repository(),
            clock,
        }));

        let server = ChatServer::bind(
            "127.0.0.1",
            0,
            ServerDependencies {
                auth_service,
                chat_service,
                registry: Arc::new(ClientRegistry::new()),
            },
        )
        .await
        .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(server.serve(shutdown_rx));

        Self {
            addr,
            storage,
            shutdown,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(server: &TestServer) -> Self {
        let stream = TcpStream::connect(server.addr).await.expect("connect");
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.expect("write");
        self.write.write_all(b"\n").await.expect("write newline");
        self.write.flush().await.expect("flush");
    }

    pub async fn send(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    /// 读一帧（带超时），解析为 JSON。
    pub async fn recv(&mut self) -> Value {
        let line = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .expect("read frame")
            .expect("connection closed");
        serde_json::from_str(&line).expect("frame is json")
    }

    /// 等待服务器关闭这条连接（读到 EOF）。
    pub async fn wait_until_closed(&mut self) {
        loop {
            match timeout(RECV_TIMEOUT, self.lines.next_line())
                .await
                .expect("timed out waiting for close")
            {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return,
            }
        }
    }

    /// 跳过无关事件，直到读到指定类型的一帧。
    pub async fn recv_type(&mut self, event_type: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] == event_type {
                return frame;
            }
        }
    }

    /// 注册并消费 AUTH_RESPONSE 与初始 HISTORY_RESPONSE。
    /// 随后的 userJoined 广播留在流里，由调用方按需跳过。
    pub async fn register(&mut self, username: &str, password: &str) {
        self.send(auth_request("REGISTER", username, password)).await;

        let auth = self.recv().await;
        assert_eq!(auth["type"], "AUTH_RESPONSE", "unexpected frame: {auth}");
        assert_eq!(auth["data"]["username"], username);

        let history = self.recv().await;
        assert_eq!(history["type"], "HISTORY_RESPONSE", "unexpected frame: {history}");
        assert_eq!(history["data"]["scope"], "ROOM");
        assert_eq!(history["data"]["room"], "General");
    }
}

pub fn auth_request(action: &str, username: &str, password: &str) -> Value {
    json!({
        "type": "AUTH_REQUEST",
        "data": { "action": action, "username": username, "password": password }
    })
}

pub fn error_code(frame: &Value) -> &str {
    assert_eq!(frame["type"], "ERROR", "expected ERROR frame: {frame}");
    frame["data"]["code"].as_str().expect("error code")
}
