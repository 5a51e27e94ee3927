//! 领域模型错误定义

use thiserror::Error;

/// 领域层错误类型。
///
/// `Validation` 表示入参校验失败；`Database` 是存储层失败的统一标签。
/// 协议层据此映射到不同的错误码，两类错误不得混用。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    Validation { field: String, message: String },

    /// 存储错误
    #[error("数据库错误: {message}")]
    Database { message: String },
}

impl DomainError {
    /// 创建验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建存储错误
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database { .. })
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
