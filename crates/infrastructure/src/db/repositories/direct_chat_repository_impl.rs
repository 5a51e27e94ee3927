//! DM 配对仓储实现

use application::DirectChatRepository;
use async_trait::async_trait;
use domain::{DirectChatPair, DomainError, DomainResult};
use sqlx::PgPool;
use tracing::warn;

use super::{is_unique_violation, map_sqlx_err};

pub struct PgDirectChatRepository {
    pool: PgPool,
}

impl PgDirectChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 清理失败只记录日志：没有配对引用的房间本就不可达。
    async fn delete_orphan_room(&self, chat_room_id: i64) {
        let result = sqlx::query("DELETE FROM chat_room WHERE id = $1 AND room_type = 'DM'")
            .bind(chat_room_id)
            .execute(&self.pool)
            .await;

        if let Err(err) = result {
            warn!(chat_room_id, error = %err, "孤儿 DM 房间清理失败");
        }
    }
}

#[async_trait]
impl DirectChatRepository for PgDirectChatRepository {
    async fn find_dm_room_id(&self, user_a: i64, user_b: i64) -> DomainResult<Option<i64>> {
        let pair = DirectChatPair::of(user_a, user_b)?;

        sqlx::query_scalar::<_, i64>(
            "SELECT chat_room_id FROM direct_chat WHERE user_low_id = $1 AND user_high_id = $2",
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn create_dm(&self, user_a: i64, user_b: i64, chat_room_id: i64) -> DomainResult<i64> {
        let pair = DirectChatPair::of(user_a, user_b)?;
        if chat_room_id <= 0 {
            return Err(DomainError::validation("chat_room_id", "必须 > 0"));
        }

        let inserted = sqlx::query(
            "INSERT INTO direct_chat (user_low_id, user_high_id, chat_room_id) VALUES ($1, $2, $3)",
        )
        .bind(pair.low())
        .bind(pair.high())
        .bind(chat_room_id)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(chat_room_id),
            Err(err) if is_unique_violation(&err) => {
                // 另一条连接先写入了配对：回收本侧的孤儿 DM 房间
                match self.find_dm_room_id(user_a, user_b).await? {
                    Some(existing) => {
                        if existing != chat_room_id {
                            self.delete_orphan_room(chat_room_id).await;
                        }
                        Ok(existing)
                    }
                    None => Err(map_sqlx_err(err)),
                }
            }
            Err(err) => Err(map_sqlx_err(err)),
        }
    }
}
