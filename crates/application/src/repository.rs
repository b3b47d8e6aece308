//! 持久化端口
//!
//! 存储层只需要实现这里的窄接口，核心流程不关心具体的存储引擎。

use async_trait::async_trait;
use domain::{
    BlockRelation, Message, MessageId, NewMessage, NewUser, PresenceStatus, RepositoryError,
    Timestamp, User, UserEmail, UserId, Username,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 用户名或邮箱重复时返回 `RepositoryError::Conflict`
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username)
        -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    /// 状态列只是在线注册表的镜像
    async fn update_status(
        &self,
        id: UserId,
        status: PresenceStatus,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存消息并返回分配了 id 的完整记录
    async fn save(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    // 以下查询均按时间升序返回，且不包含已撤回的消息
    async fn recent_public(&self, limit: u32) -> Result<Vec<Message>, RepositoryError>;

    async fn private_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 软删除；仅当消息存在、属于 `requester` 且尚未删除时返回 true
    async fn delete_message(
        &self,
        id: MessageId,
        requester: UserId,
        at: Timestamp,
    ) -> Result<bool, RepositoryError>;

    /// 删除早于 `cutoff` 的消息，返回删除条数
    async fn cleanup_older_than(&self, cutoff: Timestamp) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// 已存在时不重复插入，返回是否新增
    async fn block(&self, relation: BlockRelation) -> Result<bool, RepositoryError>;
    async fn unblock(
        &self,
        user_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<bool, RepositoryError>;
    async fn blocked_users(&self, user_id: UserId) -> Result<Vec<UserId>, RepositoryError>;
}
