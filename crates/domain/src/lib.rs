//! 聊天室系统核心领域模型
//!
//! 包含用户、消息、屏蔽关系等核心实体，以及敏感内容过滤规则。

pub mod block;
pub mod content_filter;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use block::BlockRelation;
pub use content_filter::{ContentFilter, FilterOutcome, REDACTION_MARKER};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Message, MessageKind, NewMessage, Recipient};
pub use user::{NewUser, PresenceStatus, User};
pub use value_objects::{
    MessageContent, MessageId, PasswordHash, Timestamp, UserEmail, UserId, Username,
};
