use crate::Timestamp;

/// 注册用户。
///
/// `username` 在存储层是大小写不敏感的唯一键，边界处统一小写后入库；
/// 事件中展示的是入库形态。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    /// 存储分配的稳定数字标识；尚未持久化时为 None。
    pub id: Option<i64>,
    pub username: String,
    #[serde(skip_serializing)] // 密码哈希不暴露给客户端
    pub password_hash: String,
    pub created_at: Option<Timestamp>,
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: None,
            username: username.into(),
            password_hash: password_hash.into(),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, at: Timestamp) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
