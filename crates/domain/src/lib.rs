//! 聊天服务器核心领域模型
//!
//! 包含用户、聊天室、消息等核心实体，仓储实现共享的业务规则，
//! 以及统一的错误类型。

pub mod business_rules;
pub mod chat_room;
pub mod direct_chat;
pub mod errors;
pub mod message;
pub mod user;

pub use chat_room::{ChatRoom, RoomType};
pub use direct_chat::DirectChatPair;
pub use errors::{DomainError, DomainResult};
pub use message::{HistoryMessage, Message};
pub use user::User;

/// 统一的时间戳类型。
///
/// 线上协议采用无时区的 ISO-8601 本地时间，存储层同样使用
/// `TIMESTAMP`（不带时区），两侧共用这个别名。
pub type Timestamp = chrono::NaiveDateTime;
