use crate::errors::DomainError;
use crate::value_objects::UserId;

/// 有向屏蔽关系：`user_id` 不再看到 `blocked_user_id` 的历史消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockRelation {
    pub user_id: UserId,
    pub blocked_user_id: UserId,
}

impl BlockRelation {
    pub fn new(user_id: UserId, blocked_user_id: UserId) -> Result<Self, DomainError> {
        if !user_id.is_valid() || !blocked_user_id.is_valid() {
            return Err(DomainError::invalid_argument(
                "blocked_user_id",
                "must be a positive user id",
            ));
        }
        if user_id == blocked_user_id {
            return Err(DomainError::invalid_argument(
                "blocked_user_id",
                "cannot block yourself",
            ));
        }
        Ok(Self {
            user_id,
            blocked_user_id,
        })
    }
}
