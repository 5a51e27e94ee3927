//! 内存存储实现（用于测试与本地开发）。
//!
//! 与 Postgres 仓储遵守同一契约：查找键归一化、幂等的房间创建、
//! DM 配对竞争时的孤儿房间回收、升序的历史查询。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use application::{
    ChatRoomRepository, DirectChatRepository, MessageRepository, UserRepository,
};
use async_trait::async_trait;
use domain::{
    business_rules, ChatRoom, DirectChatPair, DomainError, DomainResult, HistoryMessage, Message,
    RoomType, Timestamp, User,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: RwLock<HashMap<i64, User>>,
    rooms: RwLock<HashMap<i64, ChatRoom>>,
    pairs: RwLock<HashMap<(i64, i64), i64>>,
    messages: RwLock<Vec<Message>>,
    user_seq: AtomicI64,
    room_seq: AtomicI64,
    message_seq: AtomicI64,
}

impl Inner {
    fn next(&self, seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// 共享同一组表的内存存储；四个仓储接口都由它实现，
/// 按需借出成 `Arc<dyn …>`。
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_repository(&self) -> Arc<dyn UserRepository> {
        Arc::new(self.clone())
    }

    pub fn room_repository(&self) -> Arc<dyn ChatRoomRepository> {
        Arc::new(self.clone())
    }

    pub fn direct_chat_repository(&self) -> Arc<dyn DirectChatRepository> {
        Arc::new(self.clone())
    }

    pub fn message_repository(&self) -> Arc<dyn MessageRepository> {
        Arc::new(self.clone())
    }

    /// 测试观察口：已持久化的消息数量。
    pub async fn message_count(&self) -> usize {
        self.inner.messages.read().await.len()
    }

    /// 测试观察口：现存的 DM 房间数量。
    pub async fn dm_room_count(&self) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .values()
            .filter(|room| room.room_type == RoomType::Dm)
            .count()
    }

    fn now() -> Timestamp {
        chrono::Local::now().naive_local()
    }
}

#[async_trait]
impl UserRepository for InMemoryStorage {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let key = business_rules::normalize_username(username);
        if key.is_empty() {
            return Ok(None);
        }

        let users = self.inner.users.read().await;
        Ok(users.values().find(|user| user.username == key).cloned())
    }

    async fn exists_by_username(&self, username: &str) -> DomainResult<bool> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    async fn save(&self, mut user: User) -> DomainResult<User> {
        if user.username.trim().is_empty() {
            return Err(DomainError::validation("username", "不能为空"));
        }
        if user.password_hash.trim().is_empty() {
            return Err(DomainError::validation("password_hash", "不能为空"));
        }

        let mut users = self.inner.users.write().await;
        match user.id {
            None => {
                // 与数据库的唯一约束对齐
                if users.values().any(|existing| existing.username == user.username) {
                    return Err(DomainError::database(format!(
                        "unique constraint violation: users.username = {}",
                        user.username
                    )));
                }

                let id = self.inner.next(&self.inner.user_seq);
                user.id = Some(id);
                if user.created_at.is_none() {
                    user.created_at = Some(Self::now());
                }
                users.insert(id, user.clone());
                Ok(user)
            }
            Some(id) => {
                if !users.contains_key(&id) {
                    return Err(DomainError::database(format!("user not found: id = {id}")));
                }
                users.insert(id, user.clone());
                Ok(user)
            }
        }
    }
}

#[async_trait]
impl ChatRoomRepository for InMemoryStorage {
    async fn find_room_id_by_name(&self, name: &str) -> DomainResult<Option<i64>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let rooms = self.inner.rooms.read().await;
        Ok(rooms
            .values()
            .find(|room| room.room_type == RoomType::Room && room.name == name)
            .map(|room| room.id))
    }

    async fn create_room(&self, name: &str) -> DomainResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("room_name", "不能为空"));
        }

        // 查找和插入放在同一把写锁里，竞争窗口天然闭合
        let mut rooms = self.inner.rooms.write().await;
        if let Some(existing) = rooms
            .values()
            .find(|room| room.room_type == RoomType::Room && room.name == name)
        {
            return Ok(existing.id);
        }

        let id = self.inner.next(&self.inner.room_seq);
        rooms.insert(
            id,
            ChatRoom {
                id,
                name: name.to_owned(),
                room_type: RoomType::Room,
                created_at: Self::now(),
            },
        );
        Ok(id)
    }

    async fn create_direct_room(&self) -> DomainResult<i64> {
        let mut rooms = self.inner.rooms.write().await;
        let id = self.inner.next(&self.inner.room_seq);
        rooms.insert(
            id,
            ChatRoom {
                id,
                name: format!("dm:{}", Uuid::new_v4()),
                room_type: RoomType::Dm,
                created_at: Self::now(),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl DirectChatRepository for InMemoryStorage {
    async fn find_dm_room_id(&self, user_a: i64, user_b: i64) -> DomainResult<Option<i64>> {
        let pair = DirectChatPair::of(user_a, user_b)?;
        let pairs = self.inner.pairs.read().await;
        Ok(pairs.get(&(pair.low(), pair.high())).copied())
    }

    async fn create_dm(&self, user_a: i64, user_b: i64, chat_room_id: i64) -> DomainResult<i64> {
        let pair = DirectChatPair::of(user_a, user_b)?;
        if chat_room_id <= 0 {
            return Err(DomainError::validation("chat_room_id", "必须 > 0"));
        }

        let mut pairs = self.inner.pairs.write().await;
        if let Some(&existing) = pairs.get(&(pair.low(), pair.high())) {
            // 配对已被另一侧写入：回收本侧的孤儿 DM 房间
            if existing != chat_room_id {
                let mut rooms = self.inner.rooms.write().await;
                if rooms
                    .get(&chat_room_id)
                    .is_some_and(|room| room.room_type == RoomType::Dm)
                {
                    rooms.remove(&chat_room_id);
                }
            }
            return Ok(existing);
        }

        pairs.insert((pair.low(), pair.high()), chat_room_id);
        Ok(chat_room_id)
    }
}

#[async_trait]
impl MessageRepository for InMemoryStorage {
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

        // 与外键约束对齐
        if !self.inner.rooms.read().await.contains_key(&chat_room_id) {
            return Err(DomainError::database(format!(
                "foreign key violation: chat_room {chat_room_id}"
            )));
        }
        if !self.inner.users.read().await.contains_key(&sender_id) {
            return Err(DomainError::database(format!(
                "foreign key violation: users {sender_id}"
            )));
        }

        let id = self.inner.next(&self.inner.message_seq);
        self.inner.messages.write().await.push(Message {
            id,
            chat_room_id,
            sender_id,
            content,
            sent_at,
        });
        Ok(id)
    }

    async fn load_history(
        &self,
        chat_room_id: i64,
        limit: i64,
    ) -> DomainResult<Vec<HistoryMessage>> {
        if chat_room_id <= 0 {
            return Err(DomainError::validation("chat_room_id", "必须 > 0"));
        }
        let limit = limit.max(1) as usize;

        let users = self.inner.users.read().await;
        let messages = self.inner.messages.read().await;

        let mut rows: Vec<&Message> = messages
            .iter()
            .filter(|message| message.chat_room_id == chat_room_id)
            .collect();
        rows.sort_by_key(|message| (message.sent_at, message.id));

        Ok(rows
            .into_iter()
            .take(limit)
            .filter_map(|message| {
                users.get(&message.sender_id).map(|sender| HistoryMessage {
                    from: sender.username.clone(),
                    content: message.content.clone(),
                    sent_at: message.sent_at,
                })
            })
            .collect())
    }
}
