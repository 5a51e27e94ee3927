//! Postgres 仓储实现集合。

mod chat_room_repository_impl;
mod direct_chat_repository_impl;
mod message_repository_impl;
mod user_repository_impl;

pub use chat_room_repository_impl::PgChatRoomRepository;
pub use direct_chat_repository_impl::PgDirectChatRepository;
pub use message_repository_impl::PgMessageRepository;
pub use user_repository_impl::PgUserRepository;

use std::sync::Arc;

use domain::DomainError;
use sqlx::PgPool;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> DomainError {
    DomainError::database(err.to_string())
}

/// Postgres 唯一约束冲突（幂等创建与 DM 配对竞争都依赖这个判定）。
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|code| code == "23505")
    )
}

/// Postgres 仓储聚合，按连接池克隆构造。
#[derive(Clone)]
pub struct PgStorage {
    pub user_repository: Arc<PgUserRepository>,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub direct_chat_repository: Arc<PgDirectChatRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            direct_chat_repository: Arc::new(PgDirectChatRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool)),
        }
    }
}
