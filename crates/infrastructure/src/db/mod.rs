//! 数据库连接与模式初始化（Core DB Layer）

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

pub mod repositories;

pub use repositories::{
    PgChatRoomRepository, PgDirectChatRepository, PgMessageRepository, PgStorage,
    PgUserRepository,
};

/// 建立连接池；单独给出的用户名/密码覆盖 URL 中的凭据。
pub async fn create_pg_pool(
    url: &str,
    username: Option<&str>,
    password: Option<&str>,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let mut options = PgConnectOptions::from_str(url)?;
    if let Some(username) = username {
        options = options.username(username);
    }
    if let Some(password) = password {
        options = options.password(password);
    }

    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// 启动前的连通性检查。
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// 内嵌的表结构，`db.init.mode = schema` 时逐条执行。
/// 公共房间名的唯一性只约束 `room_type = 'ROOM'`，DM 房间名不受限。
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_room (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        room_type VARCHAR(10) NOT NULL CHECK (room_type IN ('ROOM', 'DM')),
        created_at TIMESTAMP NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_chat_room_public_name
        ON chat_room (name) WHERE room_type = 'ROOM'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS message (
        id BIGSERIAL PRIMARY KEY,
        chat_room_id BIGINT NOT NULL REFERENCES chat_room (id),
        sender_id BIGINT NOT NULL REFERENCES users (id),
        content VARCHAR(1000) NOT NULL,
        sent_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_message_room_sent_at
        ON message (chat_room_id, sent_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS direct_chat (
        chat_room_id BIGINT NOT NULL PRIMARY KEY REFERENCES chat_room (id),
        user_low_id BIGINT NOT NULL REFERENCES users (id),
        user_high_id BIGINT NOT NULL REFERENCES users (id),
        UNIQUE (user_low_id, user_high_id),
        CHECK (user_low_id < user_high_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_chat_room (
        user_id BIGINT NOT NULL REFERENCES users (id),
        chat_room_id BIGINT NOT NULL REFERENCES chat_room (id),
        joined_at TIMESTAMP NOT NULL DEFAULT now(),
        PRIMARY KEY (user_id, chat_room_id)
    )
    "#,
];

/// 执行内嵌 DDL。所有语句幂等，重复执行安全。
pub async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
