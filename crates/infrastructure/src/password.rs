//! PBKDF2 密码哈希实现。
//!
//! 规范格式 `pbkdf2$<iterations>$<saltBase64>$<digestBase64>`（HMAC-SHA-256，
//! 默认 120 000 次迭代、16 字节盐、256 位摘要）。`verify` 同时兼容存量的
//! `<iterations>:<saltBase64>:<digestBase64>`（HMAC-SHA-1）格式；新哈希
//! 只产出规范格式。摘要比较为常量时间。

use application::{PasswordHasher, PasswordHasherError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const PREFIX: &str = "pbkdf2";
const DEFAULT_ITERATIONS: u32 = 120_000;
const SALT_BYTES: usize = 16;
const DIGEST_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct Pbkdf2PasswordHasher {
    iterations: u32,
}

impl Pbkdf2PasswordHasher {
    pub fn new(iterations: Option<u32>) -> Self {
        Self {
            iterations: iterations.unwrap_or(DEFAULT_ITERATIONS),
        }
    }
}

impl Default for Pbkdf2PasswordHasher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl PasswordHasher for Pbkdf2PasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError> {
        if plaintext.trim().is_empty() {
            return Err(PasswordHasherError::hash_error("password must not be blank"));
        }

        let iterations = self.iterations;
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hash_sync(&plaintext, iterations))
            .await
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))?
    }

    async fn verify(&self, plaintext: &str, stored: &str) -> bool {
        let plaintext = plaintext.to_owned();
        let stored = stored.to_owned();
        tokio::task::spawn_blocking(move || verify_sync(&plaintext, &stored))
            .await
            .unwrap_or(false)
    }
}

fn hash_sync(plaintext: &str, iterations: u32) -> Result<String, PasswordHasherError> {
    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);

    let mut digest = [0u8; DIGEST_BYTES];
    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, iterations, &mut digest);

    Ok(format!(
        "{PREFIX}${iterations}${}${}",
        BASE64.encode(salt),
        BASE64.encode(digest)
    ))
}

/// 解析失败一律视为不匹配，绝不向上抛错。
fn verify_sync(plaintext: &str, stored: &str) -> bool {
    if plaintext.is_empty() || stored.trim().is_empty() {
        return false;
    }

    if let Some(parsed) = parse_canonical(stored) {
        let mut actual = vec![0u8; parsed.digest.len()];
        pbkdf2_hmac::<Sha256>(
            plaintext.as_bytes(),
            &parsed.salt,
            parsed.iterations,
            &mut actual,
        );
        return actual.ct_eq(&parsed.digest).into();
    }

    if let Some(parsed) = parse_legacy(stored) {
        let mut actual = vec![0u8; parsed.digest.len()];
        pbkdf2_hmac::<Sha1>(
            plaintext.as_bytes(),
            &parsed.salt,
            parsed.iterations,
            &mut actual,
        );
        return actual.ct_eq(&parsed.digest).into();
    }

    false
}

struct ParsedHash {
    iterations: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

/// `pbkdf2$<iterations>$<saltBase64>$<digestBase64>`
fn parse_canonical(stored: &str) -> Option<ParsedHash> {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 || parts[0] != PREFIX {
        return None;
    }

    let iterations: u32 = parts[1].parse().ok().filter(|&i| i > 0)?;
    let salt = BASE64.decode(parts[2]).ok()?;
    let digest = BASE64.decode(parts[3]).ok().filter(|d| !d.is_empty())?;

    Some(ParsedHash {
        iterations,
        salt,
        digest,
    })
}

/// 存量格式 `<iterations>:<saltBase64>:<digestBase64>`
fn parse_legacy(stored: &str) -> Option<ParsedHash> {
    let parts: Vec<&str> = stored.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let iterations: u32 = parts[0].parse().ok().filter(|&i| i > 0)?;
    let salt = BASE64.decode(parts[1]).ok()?;
    let digest = BASE64.decode(parts[2]).ok().filter(|d| !d.is_empty())?;

    Some(ParsedHash {
        iterations,
        salt,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::PasswordHasher as _;

    fn test_hasher() -> Pbkdf2PasswordHasher {
        Pbkdf2PasswordHasher::new(Some(1_000))
    }

    #[tokio::test]
    async fn hash_verifies_and_rejects_wrong_password() {
        let hasher = test_hasher();
        let stored = hasher.hash("secret1").await.unwrap();

        assert_ne!(stored, "secret1");
        assert!(stored.starts_with("pbkdf2$1000$"));
        assert!(hasher.verify("secret1", &stored).await);
        assert!(!hasher.verify("secret2", &stored).await);
    }

    #[tokio::test]
    async fn rehashing_produces_a_distinct_value() {
        let hasher = test_hasher();
        let first = hasher.hash("secret1").await.unwrap();
        let second = hasher.hash("secret1").await.unwrap();

        // 盐随机，同一密码两次哈希不同，但都可验证
        assert_ne!(first, second);
        assert!(hasher.verify("secret1", &first).await);
        assert!(hasher.verify("secret1", &second).await);
    }

    #[tokio::test]
    async fn blank_password_cannot_be_hashed() {
        let hasher = test_hasher();
        assert!(hasher.hash("   ").await.is_err());
    }

    #[tokio::test]
    async fn legacy_format_still_verifies() {
        let hasher = test_hasher();

        // 按存量格式手工构造一个 SHA-1 哈希
        let salt = [7u8; 16];
        let mut digest = [0u8; 32];
        pbkdf2_hmac::<Sha1>(b"secret1", &salt, 65_536, &mut digest);
        let stored = format!("65536:{}:{}", BASE64.encode(salt), BASE64.encode(digest));

        assert!(hasher.verify("secret1", &stored).await);
        assert!(!hasher.verify("secret2", &stored).await);
    }

    #[tokio::test]
    async fn malformed_stored_hash_is_no_match() {
        let hasher = test_hasher();

        for stored in [
            "",
            "   ",
            "pbkdf2$1000$only-three-parts",
            "pbkdf2$0$AAAA$AAAA",
            "pbkdf2$notanumber$AAAA$AAAA",
            "pbkdf2$1000$*bad-base64*$AAAA",
            "bcrypt$1000$AAAA$AAAA",
            "1000:only-two",
            "plaintext",
        ] {
            assert!(!hasher.verify("secret1", stored).await, "stored={stored:?}");
        }
    }
}
