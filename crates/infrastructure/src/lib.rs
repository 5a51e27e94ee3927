//! 基础设施层实现。
//!
//! 提供 Postgres 仓储、PBKDF2 密码哈希、数据库初始化与开发环境种子，
//! 实现应用层定义的接口；`memory` 模块提供同一契约的内存存储，
//! 供测试与本地开发使用。

pub mod db;
pub mod memory;
pub mod password;
pub mod seed;

pub use db::{
    create_pg_pool, initialize_schema, ping, PgChatRoomRepository, PgDirectChatRepository,
    PgMessageRepository, PgStorage, PgUserRepository,
};
pub use memory::InMemoryStorage;
pub use password::Pbkdf2PasswordHasher;
