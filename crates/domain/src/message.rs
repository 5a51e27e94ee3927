use crate::Timestamp;

/// 持久化的消息行。只追加，不支持编辑或删除。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub sent_at: Timestamp,
}

/// 历史查询的结果行：发送者用户名、正文与时间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub from: String,
    pub content: String,
    pub sent_at: Timestamp,
}
