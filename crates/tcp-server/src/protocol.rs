//! 客户端与服务器之间交换消息的协议常量与信封编解码。
//!
//! 帧格式：一行一个 UTF-8 JSON 对象，以 `\n` 结尾：
//! `{ "type": string, "data": object|null }`
//! `data` 内的未知字段忽略；缺失的可选字段按 null 处理。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::ErrorPayload;

// ---- 事件类型（双向） ----
pub const AUTH_REQUEST: &str = "AUTH_REQUEST";
pub const AUTH_RESPONSE: &str = "AUTH_RESPONSE";

pub const CHAT_MESSAGE: &str = "CHAT_MESSAGE";
pub const DIRECT_MESSAGE: &str = "DIRECT_MESSAGE";

pub const HISTORY_REQUEST: &str = "HISTORY_REQUEST";
pub const HISTORY_RESPONSE: &str = "HISTORY_RESPONSE";

pub const USER_PRESENCE: &str = "USER_PRESENCE";

pub const ERROR: &str = "ERROR";
pub const LOGOUT: &str = "LOGOUT";

// ---- 错误码 ----
pub const INVALID_JSON: &str = "INVALID_JSON";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";
pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
pub const UNKNOWN_SCOPE: &str = "UNKNOWN_SCOPE";
pub const USER_OFFLINE: &str = "USER_OFFLINE";

// ---- 协议缺省值 ----
pub const DEFAULT_HISTORY_LIMIT: i64 = 150;
pub use domain::business_rules::MAX_MESSAGE_LENGTH;

/// 双向通用的消息信封。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("invalid json frame")]
    InvalidJson,
    #[error("type field is missing or blank")]
    MissingType,
}

/// 只用于解析：容忍 `type` 缺失/为 null，统一交给 [`Envelope::parse`] 判定。
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    pub fn of(event_type: &str, data: impl Serialize) -> Self {
        Self {
            event_type: event_type.to_owned(),
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::of(
            ERROR,
            ErrorPayload {
                code: code.to_owned(),
                message: message.into(),
            },
        )
    }

    /// 解析一帧。非法 JSON => `InvalidJson`；`type` 缺失或空白 => `MissingType`。
    pub fn parse(line: &str) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope =
            serde_json::from_str(line).map_err(|_| EnvelopeError::InvalidJson)?;

        let event_type = raw.event_type.unwrap_or_default();
        if event_type.trim().is_empty() {
            return Err(EnvelopeError::MissingType);
        }

        Ok(Self {
            event_type,
            data: raw.data,
        })
    }

    /// `type` 比较大小写不敏感（trim 后大写）。
    pub fn normalized_type(&self) -> String {
        self.event_type.trim().to_uppercase()
    }
}
