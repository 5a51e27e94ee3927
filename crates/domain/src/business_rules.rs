//! 业务规则验证
//!
//! 仓储与服务共享的校验逻辑，保证不同路径产生一致的错误。

use crate::errors::{DomainError, DomainResult};

/// 消息正文最大长度（字符数）。
pub const MAX_MESSAGE_LENGTH: usize = 1000;

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 50;
pub const PASSWORD_MIN_LENGTH: usize = 6;
pub const PASSWORD_MAX_LENGTH: usize = 100;

/// 用户名查找键归一化：trim + 小写。
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// 消息正文验证：trim 后非空且不超过上限。
///
/// ROOM 与 DM 两条写入路径都经由这里，错误形态一致。
pub fn validate_message_content(raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("content", "不能为空"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(DomainError::validation(
            "content",
            format!("超过最大长度 {MAX_MESSAGE_LENGTH}"),
        ));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_username_trims_and_lowercases() {
        assert_eq!(normalize_username("  Alice "), "alice");
        assert_eq!(normalize_username(""), "");
    }

    #[test]
    fn content_is_trimmed() {
        assert_eq!(validate_message_content("  hello  ").unwrap(), "hello");
    }

    #[test]
    fn blank_content_is_rejected() {
        assert!(validate_message_content("   ").is_err());
    }

    #[test]
    fn oversize_content_is_rejected() {
        let content = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(validate_message_content(&content).is_err());

        let content = "a".repeat(MAX_MESSAGE_LENGTH);
        assert!(validate_message_content(&content).is_ok());
    }
}
