mod auth_service;
mod chat_service;

pub use auth_service::{
    AuthErrorCode, AuthFailure, AuthResponse, AuthService, AuthServiceDependencies,
};
pub use chat_service::{ChatMessagingService, ChatMessagingServiceDependencies, DEFAULT_ROOM};
