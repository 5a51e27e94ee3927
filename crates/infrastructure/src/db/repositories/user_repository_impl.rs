//! 用户仓储实现

use application::UserRepository;
use async_trait::async_trait;
use domain::{business_rules, DomainError, DomainResult, Timestamp, User};
use sqlx::{FromRow, PgPool};

use super::map_sqlx_err;

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    password_hash: String,
    created_at: Timestamp,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: Some(record.id),
            username: record.username,
            password_hash: record.password_hash,
            created_at: Some(record.created_at),
        }
    }
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
        let key = business_rules::normalize_username(username);
        if key.is_empty() {
            return Ok(None);
        }

        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Into::into))
    }

    async fn exists_by_username(&self, username: &str) -> DomainResult<bool> {
        let key = business_rules::normalize_username(username);
        if key.is_empty() {
            return Ok(false);
        }

        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(&key)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn save(&self, user: User) -> DomainResult<User> {
        if user.username.trim().is_empty() {
            return Err(DomainError::validation("username", "不能为空"));
        }
        if user.password_hash.trim().is_empty() {
            return Err(DomainError::validation("password_hash", "不能为空"));
        }

        let record = match user.id {
            None => {
                let created_at = user
                    .created_at
                    .unwrap_or_else(|| chrono::Local::now().naive_local());

                sqlx::query_as::<_, UserRecord>(
                    r#"
                    INSERT INTO users (username, password_hash, created_at)
                    VALUES ($1, $2, $3)
                    RETURNING id, username, password_hash, created_at
                    "#,
                )
                .bind(&user.username)
                .bind(&user.password_hash)
                .bind(created_at)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?
            }
            Some(id) => sqlx::query_as::<_, UserRecord>(
                r#"
                UPDATE users
                SET username = $2, password_hash = $3
                WHERE id = $1
                RETURNING id, username, password_hash, created_at
                "#,
            )
            .bind(id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?,
        };

        Ok(record.into())
    }
}
