use crate::errors::{DomainError, DomainResult};
use crate::Timestamp;

/// 房间类型。公共房间按名字寻址；DM 房间通过配对表寻址，
/// 名称只是不可展示的合成值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RoomType {
    Room,
    Dm,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Room => "ROOM",
            RoomType::Dm => "DM",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "ROOM" => Ok(RoomType::Room),
            "DM" => Ok(RoomType::Dm),
            other => Err(DomainError::validation(
                "room_type",
                format!("未知的房间类型: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: i64,
    pub name: String,
    pub room_type: RoomType,
    pub created_at: Timestamp,
}
