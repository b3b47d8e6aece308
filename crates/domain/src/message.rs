use chrono::Duration;

use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Public,
    Private,
    System,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Public => "PUBLIC",
            MessageKind::Private => "PRIVATE",
            MessageKind::System => "SYSTEM",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "PUBLIC" => Ok(MessageKind::Public),
            "PRIVATE" => Ok(MessageKind::Private),
            "SYSTEM" => Ok(MessageKind::System),
            other => Err(DomainError::invalid_argument(
                "message_kind",
                format!("unknown kind '{other}'"),
            )),
        }
    }
}

/// 消息接收方，公共消息没有具体接收者
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Recipient {
    Public,
    User(UserId),
}

impl Recipient {
    pub fn from_column(receiver_id: Option<i64>) -> Self {
        match receiver_id {
            Some(id) => Recipient::User(UserId::new(id)),
            None => Recipient::Public,
        }
    }

    pub fn as_column(self) -> Option<i64> {
        match self {
            Recipient::Public => None,
            Recipient::User(id) => Some(id.value()),
        }
    }

    pub fn user(self) -> Option<UserId> {
        match self {
            Recipient::Public => None,
            Recipient::User(id) => Some(id),
        }
    }
}

/// 待持久化的消息，`content` 已经过敏感内容过滤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub sender_username: String,
    pub recipient: Recipient,
    pub content: MessageContent,
    pub original_content: String,
    pub kind: MessageKind,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn new(
        sender_id: UserId,
        sender_username: impl Into<String>,
        recipient: Recipient,
        content: MessageContent,
        original_content: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if !sender_id.is_valid() {
            return Err(DomainError::invalid_argument(
                "sender_id",
                "must be a positive user id",
            ));
        }
        let kind = match recipient {
            Recipient::Public => MessageKind::Public,
            Recipient::User(receiver) if receiver.is_valid() => MessageKind::Private,
            Recipient::User(_) => {
                return Err(DomainError::invalid_argument(
                    "receiver_id",
                    "must be a positive user id",
                ))
            }
        };
        Ok(Self {
            sender_id,
            sender_username: sender_username.into(),
            recipient,
            content,
            original_content: original_content.into(),
            kind,
            created_at: now,
        })
    }

    /// 持久层分配 id 后生成完整消息
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            sender_username: self.sender_username,
            recipient: self.recipient,
            content: self.content.into_inner(),
            original_content: self.original_content,
            kind: self.kind,
            created_at: self.created_at,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_username: String,
    pub recipient: Recipient,
    pub content: String,
    #[serde(skip_serializing)] // 原始内容仅用于审计
    pub original_content: String,
    pub kind: MessageKind,
    pub created_at: Timestamp,
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
}

impl Message {
    /// 撤回窗口包含边界：恰好在窗口末尾仍可撤回
    pub fn is_within_recall_window(&self, now: Timestamp, window: Duration) -> bool {
        now - self.created_at <= window
    }

    pub fn ensure_recallable_by(
        &self,
        requester: UserId,
        now: Timestamp,
        window: Duration,
    ) -> Result<(), DomainError> {
        if self.sender_id != requester {
            return Err(DomainError::NotMessageSender);
        }
        if self.is_deleted {
            return Err(DomainError::MessageAlreadyDeleted);
        }
        if !self.is_within_recall_window(now, window) {
            return Err(DomainError::RecallWindowExpired {
                window_secs: window.num_seconds(),
            });
        }
        Ok(())
    }

    pub fn mark_deleted(&mut self, at: Timestamp) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
    }
}
