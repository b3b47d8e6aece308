use std::sync::Arc;

use chrono::Duration;
use config::AppConfig;
use domain::{
    BlockRelation, DomainError, Message, MessageContent, MessageId, NewMessage, Recipient, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    filter::SharedContentFilter,
    repository::{BlockRepository, MessageRepository, UserRepository},
};

/// 聊天行为参数
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub recall_window: Duration,
    pub history_limit: u32,
    pub private_history_limit: u32,
    pub max_content_len: usize,
    pub message_retention: Duration,
    pub echo_public_to_sender: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            recall_window: Duration::seconds(config.chat.recall_window_secs as i64),
            history_limit: config.chat.history_limit,
            private_history_limit: config.chat.private_history_limit,
            max_content_len: config.chat.max_content_len,
            message_retention: Duration::days(config.retention.message_retention_days as i64),
            echo_public_to_sender: config.chat.echo_public_to_sender,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: UserId,
    pub sender_username: String,
    pub recipient: Recipient,
    pub content: String,
}

pub struct ChatServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub block_repository: Arc<dyn BlockRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub filter: Arc<SharedContentFilter>,
    pub clock: Arc<dyn Clock>,
    pub settings: ChatSettings,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.deps.settings
    }

    /// 校验、过滤并持久化。只有持久化成功的消息才会返回给调用方广播。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        if !request.sender_id.is_valid() {
            return Err(ApplicationError::validation("sender is not authenticated"));
        }
        MessageContent::with_limit(request.content.as_str(), self.deps.settings.max_content_len)?;

        if let Recipient::User(receiver_id) = request.recipient {
            if !receiver_id.is_valid() {
                return Err(DomainError::invalid_argument(
                    "receiver_id",
                    "must be a positive user id",
                )
                .into());
            }
            self.deps
                .user_repository
                .find_by_id(receiver_id)
                .await?
                .ok_or(DomainError::UserNotFound)?;
        }

        let outcome = self.deps.filter.filter(&request.content);
        if outcome.contains_sensitive {
            tracing::debug!(sender_id = %request.sender_id, "message content filtered");
        }
        let content = MessageContent::new(outcome.text)?;
        let message = NewMessage::new(
            request.sender_id,
            request.sender_username,
            request.recipient,
            content,
            request.content,
            self.deps.clock.now(),
        )?;

        let stored = self.deps.message_repository.save(message).await?;
        Ok(stored)
    }

    /// 撤回自己在窗口期内发送的消息
    pub async fn recall_message(
        &self,
        requester: UserId,
        message_id: MessageId,
    ) -> Result<MessageId, ApplicationError> {
        let message = self
            .deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound)?;

        let now = self.deps.clock.now();
        message.ensure_recallable_by(requester, now, self.deps.settings.recall_window)?;

        let deleted = self
            .deps
            .message_repository
            .delete_message(message_id, requester, now)
            .await?;
        if !deleted {
            return Err(DomainError::MessageAlreadyDeleted.into());
        }
        tracing::info!(message_id = %message_id, user_id = %requester, "message recalled");
        Ok(message_id)
    }

    /// 公共历史，按时间升序，不含被查看者屏蔽的发送者
    pub async fn history(
        &self,
        viewer: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let limit = clamp_limit(limit, self.deps.settings.history_limit);
        let messages = self.deps.message_repository.recent_public(limit).await?;
        self.without_blocked(viewer, messages).await
    }

    pub async fn private_history(
        &self,
        viewer: UserId,
        other: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let limit = clamp_limit(limit, self.deps.settings.private_history_limit);
        let messages = self
            .deps
            .message_repository
            .private_between(viewer, other, limit)
            .await?;
        self.without_blocked(viewer, messages).await
    }

    async fn without_blocked(
        &self,
        viewer: UserId,
        mut messages: Vec<Message>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let blocked = self.deps.block_repository.blocked_users(viewer).await?;
        if !blocked.is_empty() {
            messages.retain(|message| !blocked.contains(&message.sender_id));
        }
        Ok(messages)
    }

    /// 返回是否新增了屏蔽关系
    pub async fn block(&self, user_id: UserId, target: UserId) -> Result<bool, ApplicationError> {
        let relation = BlockRelation::new(user_id, target)?;
        self.deps
            .user_repository
            .find_by_id(target)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(self.deps.block_repository.block(relation).await?)
    }

    /// 不存在的屏蔽关系返回 false
    pub async fn unblock(&self, user_id: UserId, target: UserId) -> Result<bool, ApplicationError> {
        Ok(self.deps.block_repository.unblock(user_id, target).await?)
    }

    pub async fn blocked_users(&self, user_id: UserId) -> Result<Vec<UserId>, ApplicationError> {
        Ok(self.deps.block_repository.blocked_users(user_id).await?)
    }

    /// 删除超过保留期的消息
    pub async fn cleanup_expired_messages(&self) -> Result<u64, ApplicationError> {
        let cutoff = self.deps.clock.now() - self.deps.settings.message_retention;
        let removed = self
            .deps
            .message_repository
            .cleanup_older_than(cutoff)
            .await?;
        Ok(removed)
    }
}

fn clamp_limit(requested: Option<u32>, max: u32) -> u32 {
    requested.unwrap_or(max).clamp(1, max)
}
