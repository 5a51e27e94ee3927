use domain::Timestamp;
use serde::{Deserialize, Serialize};

/// 历史与投递共用的消息表示。
///
/// `room` 非空 => 公共房间消息；`to` 非空 => 私聊消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub room: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub content: String,
    pub sent_at: Timestamp,
}
