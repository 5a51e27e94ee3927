//! 单个客户端连接的处理器（传输层）。
//!
//! 职责：
//! - 从 socket 逐行读取 JSON 信封，按类型路由（AUTH/CHAT/DM/HISTORY/LOGOUT）；
//! - 维护连接的认证状态：未认证连接只接受 AUTH_REQUEST；
//! - 通过注册表投递回复、回显与 presence 事件。
//!
//! 消息的存储与历史查询属于 `ChatMessagingService`，这里不做业务逻辑。
//! 校验类错误只回给当事客户端，会话继续；读写 I/O 失败与存储失败
//! 是会话级错误，直接走清理路径。

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use application::{AuthService, ChatMessageDto, ChatMessagingService, DEFAULT_ROOM};
use domain::Timestamp;

use crate::events::{
    AuthRequest, ChatHistoryResponse, ChatMessagePayload, DirectMessagePayload, HistoryRequest,
    UserPresenceEvent,
};
use crate::protocol::{self, Envelope, EnvelopeError, MAX_MESSAGE_LENGTH};
use crate::registry::{ClientRegistry, OUTBOUND_QUEUE_CAPACITY};

/// 读超时：周期性醒来以便察觉关停信号；超时本身从不结束会话。
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// 一帧处理后的会话走向。
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

pub struct ConnectionHandler {
    client_id: u64,
    registry: Arc<ClientRegistry>,
    auth_service: Arc<AuthService>,
    chat_service: Arc<ChatMessagingService>,
    outbound: mpsc::Sender<String>,
    /// 认证成功后的绑定用户名；空表示未认证。
    username: Option<String>,
}

impl ConnectionHandler {
    /// 接管一条已接受的连接，直到会话结束。
    pub async fn run(
        client_id: u64,
        stream: TcpStream,
        registry: Arc<ClientRegistry>,
        auth_service: Arc<AuthService>,
        chat_service: Arc<ChatMessagingService>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let remote = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
        registry.add(client_id, tx.clone()).await;

        let writer = tokio::spawn(Self::write_loop(write_half, rx));

        let mut handler = Self {
            client_id,
            registry,
            auth_service,
            chat_service,
            outbound: tx,
            username: None,
        };

        info!(client_id, remote = %remote, "连接处理器启动");
        if let Err(err) = handler.read_loop(read_half, &mut shutdown).await {
            warn!(client_id, remote = %remote, error = %err, "会话异常结束");
        }

        handler.cleanup().await;
        drop(handler); // 释放最后一个发送端，写任务随之排空退出

        let _ = writer.await;
        info!(client_id, remote = %remote, "连接处理器停止");
    }

    /// 写任务：独占排空出站队列，保证对单个 socket 的写入串行。
    async fn write_loop(write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<String>) {
        let mut out = BufWriter::new(write_half);
        while let Some(line) = rx.recv().await {
            if out.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if out.write_all(b"\n").await.is_err() {
                break;
            }
            if out.flush().await.is_err() {
                break;
            }
        }
        let _ = out.shutdown().await;
    }

    async fn read_loop(
        &mut self,
        read_half: OwnedReadHalf,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => {
                    debug!(client_id = self.client_id, "收到关停信号，结束会话");
                    return Ok(());
                }
                next = timeout(READ_TIMEOUT, lines.next_line()) => next,
            };

            let line = match next {
                Err(_) => continue, // 读超时只是醒来看看
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Ok(()), // EOF
                Ok(Err(err)) => return Err(err.into()),
            };

            let frame = line.trim();
            if frame.is_empty() {
                continue;
            }

            if self.handle_incoming(frame).await? == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn handle_incoming(&mut self, frame: &str) -> Result<Flow> {
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(EnvelopeError::InvalidJson) => {
                warn!(client_id = self.client_id, "客户端发来非法 JSON");
                self.reply(Envelope::error(protocol::INVALID_JSON, "invalid JSON"))
                    .await?;
                return Ok(Flow::Continue);
            }
            Err(EnvelopeError::MissingType) => {
                self.reply(Envelope::error(
                    protocol::INVALID_REQUEST,
                    "type field is required",
                ))
                .await?;
                return Ok(Flow::Continue);
            }
        };

        match envelope.normalized_type().as_str() {
            protocol::AUTH_REQUEST => self.on_auth_request(&envelope).await?,
            protocol::CHAT_MESSAGE => self.on_chat_message(&envelope).await?,
            protocol::DIRECT_MESSAGE => self.on_direct_message(&envelope).await?,
            protocol::HISTORY_REQUEST => self.on_history_request(&envelope).await?,
            protocol::LOGOUT => {
                if self.on_logout().await? {
                    return Ok(Flow::Close);
                }
            }
            other => {
                self.reply(Envelope::error(
                    protocol::UNKNOWN_TYPE,
                    format!("unknown message type: {other}"),
                ))
                .await?;
            }
        }
        Ok(Flow::Continue)
    }

    // ------------------- processors -------------------

    async fn on_auth_request(&mut self, envelope: &Envelope) -> Result<()> {
        let Some(request) = self.parse_data::<AuthRequest>(envelope).await? else {
            return Ok(());
        };

        let action = request.action.trim().to_uppercase();
        if action.is_empty() {
            self.reply(Envelope::error(
                protocol::VALIDATION_ERROR,
                "action is required (LOGIN|REGISTER)",
            ))
            .await?;
            return Ok(());
        }

        let outcome = match action.as_str() {
            "REGISTER" => {
                self.auth_service
                    .register(&request.username, &request.password)
                    .await
            }
            "LOGIN" => {
                self.auth_service
                    .login(&request.username, &request.password)
                    .await
            }
            _ => {
                self.reply(Envelope::error(
                    protocol::UNKNOWN_ACTION,
                    format!("unknown action: {}", request.action),
                ))
                .await?;
                return Ok(());
            }
        };

        let auth = match outcome {
            Ok(auth) => auth,
            Err(failure) => {
                self.reply(Envelope::error(failure.code.as_str(), failure.message))
                    .await?;
                return Ok(());
            }
        };

        self.username = Some(auth.username.clone());
        self.registry
            .bind_username(self.client_id, &auth.username)
            .await;

        // 1) 认证成功
        self.reply(Envelope::of(protocol::AUTH_RESPONSE, &auth)).await?;

        // 2) 默认房间历史
        let messages = self
            .chat_service
            .get_room_history(DEFAULT_ROOM, protocol::DEFAULT_HISTORY_LIMIT)
            .await
            .map_err(|err| anyhow!("加载默认房间历史失败: {err}"))?;
        self.reply(Envelope::of(
            protocol::HISTORY_RESPONSE,
            &ChatHistoryResponse {
                scope: "ROOM".to_owned(),
                room: Some(DEFAULT_ROOM.to_owned()),
                peer: None,
                messages,
            },
        ))
        .await?;

        // 3) presence，必须在响应与历史之后
        self.broadcast_presence("userJoined", &auth.username).await;
        Ok(())
    }

    async fn on_chat_message(&mut self, envelope: &Envelope) -> Result<()> {
        if !self.require_authed().await? {
            return Ok(());
        }
        let Some(payload) = self.parse_data::<ChatMessagePayload>(envelope).await? else {
            return Ok(());
        };

        let room = {
            let raw = payload.room.as_deref().unwrap_or("").trim();
            if raw.is_empty() {
                DEFAULT_ROOM.to_owned()
            } else {
                raw.to_owned()
            }
        };

        let Some(content) = self.normalize_content(payload.content.as_deref()).await? else {
            return Ok(());
        };

        let username = self.bound_username();
        let sent_at = normalize_sent_at(payload.sent_at);

        // 先持久化；存储失败是会话级错误
        self.chat_service
            .post_to_room(&room, &username, &content, Some(sent_at))
            .await
            .map_err(|err| anyhow!("房间消息持久化失败: {err}"))?;

        // 广播给所有客户端（包括发送者自己）
        let dto = ChatMessageDto {
            room: Some(room),
            from: username,
            to: None,
            content,
            sent_at,
        };
        self.registry
            .broadcast(&Envelope::of(protocol::CHAT_MESSAGE, &dto))
            .await;
        Ok(())
    }

    async fn on_direct_message(&mut self, envelope: &Envelope) -> Result<()> {
        if !self.require_authed().await? {
            return Ok(());
        }
        let Some(payload) = self.parse_data::<DirectMessagePayload>(envelope).await? else {
            return Ok(());
        };

        let to = payload.to.as_deref().unwrap_or("").trim().to_owned();
        if to.is_empty() {
            self.reply(Envelope::error(protocol::VALIDATION_ERROR, "to is required"))
                .await?;
            return Ok(());
        }

        let Some(content) = self.normalize_content(payload.content.as_deref()).await? else {
            return Ok(());
        };

        let username = self.bound_username();
        let sent_at = normalize_sent_at(payload.sent_at);

        // 无论对端是否在线都先落库
        self.chat_service
            .post_direct(&username, &to, &content, Some(sent_at))
            .await
            .map_err(|err| anyhow!("私聊消息持久化失败: {err}"))?;

        let dto = ChatMessageDto {
            room: None,
            from: username,
            to: Some(to.clone()),
            content,
            sent_at,
        };
        let event = Envelope::of(protocol::DIRECT_MESSAGE, &dto);

        let delivered = self.registry.send_to_user(&to, &event).await;
        if !delivered {
            self.reply(Envelope::error(
                protocol::USER_OFFLINE,
                format!("user is offline: {to}"),
            ))
            .await?;
        }

        // 发送者总是收到自己的回显
        self.registry.send_to_client(self.client_id, &event).await;
        Ok(())
    }

    async fn on_history_request(&mut self, envelope: &Envelope) -> Result<()> {
        if !self.require_authed().await? {
            return Ok(());
        }
        let Some(request) = self.parse_data::<HistoryRequest>(envelope).await? else {
            return Ok(());
        };

        let scope_raw = request.scope.unwrap_or_default();
        let scope = scope_raw.trim().to_uppercase();
        let limit = request
            .limit
            .filter(|&limit| limit > 0)
            .unwrap_or(protocol::DEFAULT_HISTORY_LIMIT);

        match scope.as_str() {
            "ROOM" => {
                let room = request.room.as_deref().unwrap_or("").trim().to_owned();
                if room.is_empty() {
                    self.reply(Envelope::error(
                        protocol::VALIDATION_ERROR,
                        "room is required for scope=ROOM",
                    ))
                    .await?;
                    return Ok(());
                }

                let messages = self
                    .chat_service
                    .get_room_history(&room, limit)
                    .await
                    .map_err(|err| anyhow!("加载房间历史失败: {err}"))?;
                self.reply(Envelope::of(
                    protocol::HISTORY_RESPONSE,
                    &ChatHistoryResponse {
                        scope: "ROOM".to_owned(),
                        room: Some(room),
                        peer: None,
                        messages,
                    },
                ))
                .await?;
            }
            "DM" => {
                let peer = request.peer.as_deref().unwrap_or("").trim().to_owned();
                if peer.is_empty() {
                    self.reply(Envelope::error(
                        protocol::VALIDATION_ERROR,
                        "peer is required for scope=DM",
                    ))
                    .await?;
                    return Ok(());
                }

                let username = self.bound_username();
                let messages = self
                    .chat_service
                    .get_direct_history(&username, &peer, limit)
                    .await
                    .map_err(|err| anyhow!("加载私聊历史失败: {err}"))?;
                self.reply(Envelope::of(
                    protocol::HISTORY_RESPONSE,
                    &ChatHistoryResponse {
                        scope: "DM".to_owned(),
                        room: None,
                        peer: Some(peer),
                        messages,
                    },
                ))
                .await?;
            }
            _ => {
                self.reply(Envelope::error(
                    protocol::UNKNOWN_SCOPE,
                    format!("unknown scope: {scope_raw}"),
                ))
                .await?;
            }
        }
        Ok(())
    }

    /// 返回 true 表示完成了登出，会话应当关闭。
    async fn on_logout(&mut self) -> Result<bool> {
        if !self.require_authed().await? {
            return Ok(false);
        }

        let left = self.username.take();

        // 先移除，让 onlineCount 反映离开之后的状态
        self.registry.remove(self.client_id).await;
        if let Some(username) = left {
            self.broadcast_presence("userLeft", &username).await;
        }

        info!(client_id = self.client_id, "客户端登出");
        Ok(true)
    }

    // ------------------- helpers -------------------

    async fn require_authed(&mut self) -> Result<bool> {
        let authed = self
            .username
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty());
        if authed {
            return Ok(true);
        }

        self.reply(Envelope::error(
            protocol::UNAUTHORIZED,
            "authentication required",
        ))
        .await?;
        Ok(false)
    }

    /// data 缺失或形状不对 => 回 INVALID_REQUEST，返回 None；会话继续。
    async fn parse_data<T: DeserializeOwned>(
        &mut self,
        envelope: &Envelope,
    ) -> Result<Option<T>> {
        let Some(value) = envelope.data.clone() else {
            self.reply(Envelope::error(
                protocol::INVALID_REQUEST,
                "data field is required",
            ))
            .await?;
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => {
                self.reply(Envelope::error(
                    protocol::INVALID_REQUEST,
                    "data field has invalid format",
                ))
                .await?;
                Ok(None)
            }
        }
    }

    /// 正文校验与仓储一致：trim 后非空且 ≤ 1000 字符。
    async fn normalize_content(&mut self, content: Option<&str>) -> Result<Option<String>> {
        let trimmed = content.unwrap_or("").trim();
        if trimmed.is_empty() {
            self.reply(Envelope::error(
                protocol::VALIDATION_ERROR,
                "content must not be blank",
            ))
            .await?;
            return Ok(None);
        }
        if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
            self.reply(Envelope::error(
                protocol::VALIDATION_ERROR,
                format!("content exceeds maximum length {MAX_MESSAGE_LENGTH}"),
            ))
            .await?;
            return Ok(None);
        }
        Ok(Some(trimmed.to_owned()))
    }

    async fn broadcast_presence(&self, event: &str, username: &str) {
        if username.trim().is_empty() {
            return;
        }

        let online_count = self.registry.online_count().await;
        let online_snapshot = self.registry.online_snapshot().await;
        debug!(online = ?online_snapshot, "在线用户快照");

        self.registry
            .broadcast(&Envelope::of(
                protocol::USER_PRESENCE,
                &UserPresenceEvent {
                    event: event.to_owned(),
                    username: username.to_owned(),
                    online_count,
                },
            ))
            .await;
    }

    async fn reply(&mut self, envelope: Envelope) -> Result<()> {
        let line = serde_json::to_string(&envelope)?;
        self.outbound
            .send(line)
            .await
            .map_err(|_| anyhow!("出站队列已关闭"))?;
        Ok(())
    }

    fn bound_username(&self) -> String {
        self.username.clone().unwrap_or_default()
    }

    /// 会话结束的统一清理：移出注册表，必要时广播 userLeft。
    /// LOGOUT 路径已经把 username 置空，不会二次广播。
    async fn cleanup(&mut self) {
        self.registry.remove(self.client_id).await;

        if let Some(username) = self.username.take() {
            if !username.trim().is_empty() {
                self.broadcast_presence("userLeft", &username).await;
            }
        }
    }
}

fn normalize_sent_at(sent_at: Option<Timestamp>) -> Timestamp {
    sent_at.unwrap_or_else(|| chrono::Local::now().naive_local())
}
