//! 聊天消息用例服务
//!
//! 负责房间/私聊消息的持久化与历史查询，并确保公共房间与 DM 房间存在。
//! 正文校验委托给消息仓储，使 ROOM 与 DM 两条路径产生一致的错误。

use std::sync::Arc;

use domain::{DomainError, DomainResult, Timestamp};

use crate::clock::Clock;
use crate::dto::ChatMessageDto;
use crate::repository::{
    ChatRoomRepository, DirectChatRepository, MessageRepository, UserRepository,
};

/// 默认公共房间；room 留空的消息都落到这里。
pub const DEFAULT_ROOM: &str = "General";

pub struct ChatMessagingServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub direct_chat_repository: Arc<dyn DirectChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatMessagingService {
    deps: ChatMessagingServiceDependencies,
}

impl ChatMessagingService {
    pub fn new(deps: ChatMessagingServiceDependencies) -> Self {
        Self { deps }
    }

    /// 持久化一条公共房间消息；房间首次被引用时惰性创建。
    pub async fn post_to_room(
        &self,
        room: &str,
        from_user: &str,
        content: &str,
        sent_at: Option<Timestamp>,
    ) -> DomainResult<()> {
        let room_name = normalize_room(room);
        let room_id = self.deps.room_repository.create_room(&room_name).await?;
        let sender_id = self.require_user_id(from_user).await?;
        let sent_at = self.normalize_sent_at(sent_at);

        self.deps
            .message_repository
            .save_message(room_id, sender_id, content, sent_at)
            .await?;
        Ok(())
    }

    /// 持久化一条私聊消息；配对不存在时先建 DM 房间再绑定。
    pub async fn post_direct(
        &self,
        from_user: &str,
        to_user: &str,
        content: &str,
        sent_at: Option<Timestamp>,
    ) -> DomainResult<()> {
        let from_id = self.require_user_id(from_user).await?;
        let to_id = self.require_user_id(to_user).await?;

        let room_id = self.ensure_direct_room(from_id, to_id).await?;
        let sent_at = self.normalize_sent_at(sent_at);

        self.deps
            .message_repository
            .save_message(room_id, from_id, content, sent_at)
            .await?;
        Ok(())
    }

    /// 公共房间历史，升序。房间不存在时按首次引用语义创建，返回空历史。
    pub async fn get_room_history(
        &self,
        room: &str,
        limit: i64,
    ) -> DomainResult<Vec<ChatMessageDto>> {
        let room_name = normalize_room(room);
        let room_id = self.deps.room_repository.create_room(&room_name).await?;

        let raw = self
            .deps
            .message_repository
            .load_history(room_id, limit.max(1))
            .await?;

        Ok(raw
            .into_iter()
            .map(|message| ChatMessageDto {
                room: Some(room_name.clone()),
                from: message.from,
                to: None,
                content: message.content,
                sent_at: message.sent_at,
            })
            .collect())
    }

    /// 私聊历史，升序。没有配对时返回空列表，不会创建 DM 房间。
    /// `to` 投影为"配对中的另一个人"。
    pub async fn get_direct_history(
        &self,
        user_a: &str,
        user_b: &str,
        limit: i64,
    ) -> DomainResult<Vec<ChatMessageDto>> {
        let a_id = self.require_user_id(user_a).await?;
        let b_id = self.require_user_id(user_b).await?;

        let Some(room_id) = self
            .deps
            .direct_chat_repository
            .find_dm_room_id(a_id, b_id)
            .await?
        else {
            return Ok(Vec::new());
        };

        let raw = self
            .deps
            .message_repository
            .load_history(room_id, limit.max(1))
            .await?;

        let a_key = user_a.trim().to_lowercase();
        Ok(raw
            .into_iter()
            .map(|message| {
                let to = if message.from.to_lowercase() == a_key {
                    user_b
                } else {
                    user_a
                };
                ChatMessageDto {
                    room: None,
                    from: message.from,
                    to: Some(to.trim().to_owned()),
                    content: message.content,
                    sent_at: message.sent_at,
                }
            })
            .collect())
    }

    async fn ensure_direct_room(&self, user_a: i64, user_b: i64) -> DomainResult<i64> {
        if let Some(existing) = self
            .deps
            .direct_chat_repository
            .find_dm_room_id(user_a, user_b)
            .await?
        {
            return Ok(existing);
        }

        let room_id = self.deps.room_repository.create_direct_room().await?;
        self.deps
            .direct_chat_repository
            .create_dm(user_a, user_b, room_id)
            .await
    }

    async fn require_user_id(&self, username: &str) -> DomainResult<i64> {
        let name = username.trim();
        if name.is_empty() {
            return Err(DomainError::validation("username", "不能为空"));
        }

        let user = self
            .deps
            .user_repository
            .find_by_username(name)
            .await?
            .ok_or_else(|| DomainError::database(format!("user not found: {name}")))?;

        match user.id {
            Some(id) if id > 0 => Ok(id),
            _ => Err(DomainError::database(format!(
                "user has no valid id: {name}"
            ))),
        }
    }

    fn normalize_sent_at(&self, sent_at: Option<Timestamp>) -> Timestamp {
        sent_at.unwrap_or_else(|| self.deps.clock.now())
    }
}

fn normalize_room(room: &str) -> String {
    let trimmed = room.trim();
    if trimmed.is_empty() {
        DEFAULT_ROOM.to_owned()
    } else {
        trimmed.to_owned()
    }
}
