use async_trait::async_trait;
use domain::{DomainError, PasswordHash};
use thiserror::Error;

/// 注册密码的最小长度
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("hash error: {0}")]
    Hash(String),
    #[error("verify error: {0}")]
    Verify(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }

    pub fn verify_error(message: impl Into<String>) -> Self {
        Self::Verify(message.into())
    }
}

/// 哈希前的明文密码规则
pub fn check_password_policy(plaintext: &str) -> Result<(), DomainError> {
    if plaintext.trim().is_empty() {
        return Err(DomainError::invalid_argument("password", "cannot be empty"));
    }
    if plaintext.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::invalid_argument(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError>;
    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError>;
}
