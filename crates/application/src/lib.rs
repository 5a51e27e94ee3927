//! 应用层实现。
//!
//! 围绕领域模型的用例服务：认证、聊天消息持久化与历史查询，
//! 以及对外部适配器（密码哈希、时钟、仓储）的抽象。

pub mod clock;
pub mod dto;
pub mod password;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use dto::ChatMessageDto;
pub use password::{PasswordHasher, PasswordHasherError};
pub use repository::{
    ChatRoomRepository, DirectChatRepository, MessageRepository, UserRepository,
};
pub use services::{
    AuthErrorCode, AuthFailure, AuthResponse, AuthService, AuthServiceDependencies,
    ChatMessagingService, ChatMessagingServiceDependencies, DEFAULT_ROOM,
};
