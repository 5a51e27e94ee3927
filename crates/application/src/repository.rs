use async_trait::async_trait;
use domain::{DomainResult, HistoryMessage, Timestamp, User};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 按用户名查找。入参按查找键归一化（trim + 小写），空串视为未命中。
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>>;

    async fn exists_by_username(&self, username: &str) -> DomainResult<bool>;

    /// id 为空则插入（由存储分配 id，created_at 缺省为当前时间），否则更新。
    /// 空白的用户名或哈希会被拒绝。
    async fn save(&self, user: User) -> DomainResult<User>;
}

#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    /// 仅在 `room_type = ROOM` 范围内按名字查找。
    async fn find_room_id_by_name(&self, name: &str) -> DomainResult<Option<i64>>;

    /// 幂等创建公共房间；同名并发创建撞上唯一约束时重读并返回既有 id。
    async fn create_room(&self, name: &str) -> DomainResult<i64>;

    /// 创建 DM 房间（名称为不可展示的合成值），返回新 id。
    async fn create_direct_room(&self) -> DomainResult<i64>;
}

#[async_trait]
pub trait DirectChatRepository: Send + Sync {
    /// 配对按 `(min, max)` 归一化；`a == b` 或非正数 id 是非法入参。
    async fn find_dm_room_id(&self, user_a: i64, user_b: i64) -> DomainResult<Option<i64>>;

    /// 将预创建的 DM 房间绑定到用户对。配对已被并发写入时，
    /// 回收本侧的孤儿房间并返回既有房间的 id。
    async fn create_dm(&self, user_a: i64, user_b: i64, chat_room_id: i64) -> DomainResult<i64>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 校验 id > 0、正文（trim 后非空且 ≤ 1000 字符）后落库，返回新消息 id。
    async fn save_message(
        &self,
        chat_room_id: i64,
        sender_id: i64,
        content: &str,
        sent_at: Timestamp,
    ) -> DomainResult<i64>;

    /// 按 sent_at 升序加载，最多 `max(1, limit)` 条。
    async fn load_history(
        &self,
        chat_room_id: i64,
        limit: i64,
    ) -> DomainResult<Vec<HistoryMessage>>;
}
