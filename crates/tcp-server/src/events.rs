//! 协议事件载荷。
//!
//! 与客户端约定 camelCase 字段；时间戳为无时区的 ISO-8601 本地时间。
//! 入站载荷的字段全部可缺省，必填校验在连接处理器里完成，
//! 这样缺字段得到的是协议错误而不是解析失败。

use application::ChatMessageDto;
use domain::Timestamp;
use serde::{Deserialize, Serialize};

pub use application::AuthResponse;

/// AUTH_REQUEST 载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// 入站 CHAT_MESSAGE 载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sent_at: Option<Timestamp>,
}

/// 入站 DIRECT_MESSAGE 载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessagePayload {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sent_at: Option<Timestamp>,
}

/// HISTORY_REQUEST 载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub peer: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// HISTORY_RESPONSE 载荷。scope=ROOM 时带 room，scope=DM 时带 peer。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub scope: String,
    pub room: Option<String>,
    pub peer: Option<String>,
    pub messages: Vec<ChatMessageDto>,
}

/// USER_PRESENCE 载荷。`online_count` 为广播瞬间的绑定连接数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresenceEvent {
    pub event: String,
    pub username: String,
    pub online_count: usize,
}

/// ERROR 载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}
