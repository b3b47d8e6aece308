use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
    /// 令牌缺失、无效或过期统一报告为认证失败，不区分具体原因
    #[error("authentication failed")]
    Authentication,
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApplicationError::Validation(message.into())
    }

    /// 可以原样返回给客户端的错误描述
    pub fn client_message(&self) -> String {
        match self {
            ApplicationError::Domain(err) => err.to_string(),
            ApplicationError::Validation(message) => message.clone(),
            ApplicationError::Authentication => "Authentication failed".to_string(),
            ApplicationError::Repository(RepositoryError::NotFound) => "not found".to_string(),
            ApplicationError::Repository(RepositoryError::Conflict) => {
                "already exists".to_string()
            }
            ApplicationError::Repository(RepositoryError::Storage { .. })
            | ApplicationError::Password(_)
            | ApplicationError::Infrastructure(_) => "internal server error".to_string(),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
