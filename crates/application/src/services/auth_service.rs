//! 认证服务
//!
//! 负责注册与登录的输入归一化、校验，以及统一的结果编码。
//! 不依赖传输层，除仓储外不做任何 I/O，也绝不记录明文密码。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use domain::business_rules::{
    PASSWORD_MAX_LENGTH, PASSWORD_MIN_LENGTH, USERNAME_MAX_LENGTH, USERNAME_MIN_LENGTH,
};
use domain::{DomainError, User};

use crate::clock::Clock;
use crate::password::PasswordHasher;
use crate::repository::UserRepository;

/// 认证失败的稳定错误码，协议层原样下发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    ValidationError,
    UserExists,
    UserNotFound,
    InvalidPassword,
    DatabaseError,
    InternalError,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::ValidationError => "VALIDATION_ERROR",
            AuthErrorCode::UserExists => "USER_EXISTS",
            AuthErrorCode::UserNotFound => "USER_NOT_FOUND",
            AuthErrorCode::InvalidPassword => "INVALID_PASSWORD",
            AuthErrorCode::DatabaseError => "DATABASE_ERROR",
            AuthErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthFailure {
    fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// 认证成功返回给客户端的数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub username: String,
}

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    /// 注册新用户。成功时返回归一化后的用户名。
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthFailure> {
        let (username, password) = normalize_and_validate(username, password)?;

        match self.deps.user_repository.exists_by_username(&username).await {
            Ok(true) => {
                warn!(username = %username, "注册被拒绝: 用户已存在");
                return Err(AuthFailure::new(
                    AuthErrorCode::UserExists,
                    "user already exists",
                ));
            }
            Ok(false) => {}
            Err(err) => return Err(map_storage_error(err)),
        }

        let hash = match self.deps.password_hasher.hash(&password).await {
            Ok(hash) => hash,
            Err(err) => {
                error!(username = %username, error = %err, "密码哈希失败");
                return Err(AuthFailure::new(
                    AuthErrorCode::InternalError,
                    "internal server error",
                ));
            }
        };

        let user = User::new(username.clone(), hash).with_created_at(self.deps.clock.now());
        if let Err(err) = self.deps.user_repository.save(user).await {
            return Err(map_storage_error(err));
        }

        info!(username = %username, "用户注册成功");
        Ok(AuthResponse { username })
    }

    /// 登录。成功时返回入库形态的用户名。
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, AuthFailure> {
        let (username, password) = normalize_and_validate(username, password)?;

        let user = match self.deps.user_repository.find_by_username(&username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(username = %username, "登录被拒绝: 用户不存在");
                return Err(AuthFailure::new(
                    AuthErrorCode::UserNotFound,
                    "user not found",
                ));
            }
            Err(err) => return Err(map_storage_error(err)),
        };

        if !self
            .deps
            .password_hasher
            .verify(&password, &user.password_hash)
            .await
        {
            warn!(username = %username, "登录被拒绝: 密码错误");
            return Err(AuthFailure::new(
                AuthErrorCode::InvalidPassword,
                "invalid password",
            ));
        }

        info!(username = %username, "用户登录成功");
        Ok(AuthResponse {
            username: user.username,
        })
    }
}

/// 注册与登录共用的归一化 + 校验：
/// 两个字段先 trim 并要求非空；用户名再小写作为唯一键；
/// 用户名 3..=50 字符，密码 6..=100 字符。
fn normalize_and_validate(username: &str, password: &str) -> Result<(String, String), AuthFailure> {
    let username = username.trim();
    let password = password.trim();

    if username.is_empty() || password.is_empty() {
        return Err(AuthFailure::new(
            AuthErrorCode::ValidationError,
            "username and password are required",
        ));
    }

    let username = username.to_lowercase();

    let username_len = username.chars().count();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&username_len) {
        return Err(AuthFailure::new(
            AuthErrorCode::ValidationError,
            format!("username must be {USERNAME_MIN_LENGTH}..{USERNAME_MAX_LENGTH} characters"),
        ));
    }

    let password_len = password.chars().count();
    if !(PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&password_len) {
        return Err(AuthFailure::new(
            AuthErrorCode::ValidationError,
            format!("password must be {PASSWORD_MIN_LENGTH}..{PASSWORD_MAX_LENGTH} characters"),
        ));
    }

    Ok((username, password.to_owned()))
}

/// 存储失败映射到 DATABASE_ERROR；其余意外错误映射到 INTERNAL_ERROR。
/// 数据库层的错误详情由仓储记录，这里不重复泄漏。
fn map_storage_error(err: DomainError) -> AuthFailure {
    if err.is_database() {
        AuthFailure::new(AuthErrorCode::DatabaseError, "database error")
    } else {
        AuthFailure::new(AuthErrorCode::InternalError, "internal server error")
    }
}
