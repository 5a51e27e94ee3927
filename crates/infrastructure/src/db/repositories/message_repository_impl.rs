//! 消息仓储实现

use application::MessageRepository;
use async_trait::async_trait;
use domain::{business_rules, DomainError, DomainResult, HistoryMessage, Timestamp};
use sqlx::{FromRow, PgPool};

use super::map_sqlx_err;

#[derive(Debug, FromRow)]
struct HistoryRecord {
    from_username: String,
    content: String,
    sent_at: Timestamp,
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save_message(
        &self,
        chat_room_id: i64,
        sender_id: i64,
        content: &str,
        sent_at: Timestamp,
    ) -> DomainResult<i64> {
        if chat_room_id <= 0 {
            return Err(DomainError::validation("chat_room_id", "必须 > 0"));
        }
        if sender_id <= 0 {
            return Err(DomainError::validation("sender_id", "必须 > 0"));
        }
        let content = business_rules::validate_message_content(content)?;

        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO message (chat_room_id, sender_id, content, sent_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(chat_room_id)
        .bind(sender_id)
        .bind(&content)
        .bind(sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn load_history(
        &self,
        chat_room_id: i64,
        limit: i64,
    ) -> DomainResult<Vec<HistoryMessage>> {
        if chat_room_id <= 0 {
            return Err(DomainError::validation("chat_room_id", "必须 > 0"));
        }
        let limit = limit.max(1);

        let records = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT u.username AS from_username,
                   m.content,
                   m.sent_at
            FROM message m
            JOIN users u ON u.id = m.sender_id
            WHERE m.chat_room_id = $1
            ORDER BY m.sent_at ASC
            LIMIT $2
            "#,
        )
        .bind(chat_room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records
            .into_iter()
            .map(|record| HistoryMessage {
                from: record.from_username,
                content: record.content,
                sent_at: record.sent_at,
            })
            .collect())
    }
}
