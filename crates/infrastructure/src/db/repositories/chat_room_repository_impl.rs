//! 聊天室仓储实现

use application::ChatRoomRepository;
use async_trait::async_trait;
use domain::{DomainError, DomainResult, RoomType};
use sqlx::PgPool;
use uuid::Uuid;

use super::{is_unique_violation, map_sqlx_err};

pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn find_room_id_by_name(&self, name: &str) -> DomainResult<Option<i64>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM chat_room WHERE room_type = $1 AND name = $2",
        )
        .bind(RoomType::Room.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn create_room(&self, name: &str) -> DomainResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("room_name", "不能为空"));
        }

        if let Some(existing) = self.find_room_id_by_name(name).await? {
            return Ok(existing);
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO chat_room (name, room_type) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(RoomType::Room.as_str())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(id),
            // 同名房间被并发创建：唯一约束冲突后重读既有 id
            Err(err) if is_unique_violation(&err) => self
                .find_room_id_by_name(name)
                .await?
                .ok_or_else(|| map_sqlx_err(err)),
            Err(err) => Err(map_sqlx_err(err)),
        }
    }

    async fn create_direct_room(&self) -> DomainResult<i64> {
        // 合成的不可展示名称，仅保证彼此不同
        let technical_name = format!("dm:{}", Uuid::new_v4());

        sqlx::query_scalar::<_, i64>(
            "INSERT INTO chat_room (name, room_type) VALUES ($1, $2) RETURNING id",
        )
        .bind(&technical_name)
        .bind(RoomType::Dm.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }
}
