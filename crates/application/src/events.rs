//! WebSocket 帧格式
//!
//! 入站帧在边界处一次性解码为 `ClientEvent`，出站帧统一由 `ServerEvent` 序列化。

use domain::{Message, MessageId, MessageKind, PresenceStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::OnlineUser;

/// 客户端发来的事件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Auth {
        token: String,
    },
    Chat {
        #[serde(alias = "message")]
        content: String,
    },
    Private {
        receiver_id: i64,
        content: String,
    },
    Status {
        status: PresenceStatus,
    },
    Recall {
        message_id: i64,
    },
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|err| FrameError::Malformed(err.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Auth { .. } => "auth",
            ClientEvent::Chat { .. } => "chat",
            ClientEvent::Private { .. } => "private",
            ClientEvent::Status { .. } => "status",
            ClientEvent::Recall { .. } => "recall",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// JSON 格式错误、未知类型或缺少字段
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("binary frames are not supported")]
    Binary,
}

/// 聊天消息在帧中的表示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub sender_username: String,
    pub content: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.recipient.user(),
            sender_username: message.sender_username.clone(),
            content: message.content.clone(),
            timestamp: message.created_at.timestamp_millis(),
            kind: message.kind,
        }
    }
}

/// 服务端推送的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthSuccess {
        message: String,
        user_id: UserId,
        username: String,
    },
    Error {
        message: String,
    },
    Message {
        message: MessagePayload,
    },
    PrivateMessage {
        message: MessagePayload,
    },
    UserList {
        users: Vec<OnlineUser>,
    },
    StatusUpdate {
        user_id: UserId,
        username: String,
        status: PresenceStatus,
    },
    MessageRecalled {
        message_id: MessageId,
    },
    UserJoined {
        username: String,
        online_count: usize,
        timestamp: i64,
    },
    UserLeft {
        username: String,
        online_count: usize,
        timestamp: i64,
    },
}

impl ServerEvent {
    pub fn auth_success(user_id: UserId, username: impl Into<String>) -> Self {
        ServerEvent::AuthSuccess {
            message: "Authentication successful".to_string(),
            user_id,
            username: username.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn user_joined(username: impl Into<String>, online_count: usize, at: Timestamp) -> Self {
        ServerEvent::UserJoined {
            username: username.into(),
            online_count,
            timestamp: at.timestamp_millis(),
        }
    }

    pub fn user_left(username: impl Into<String>, online_count: usize, at: Timestamp) -> Self {
        ServerEvent::UserLeft {
            username: username.into(),
            online_count,
            timestamp: at.timestamp_millis(),
        }
    }

    /// 按消息类型选择公共或私聊信封
    pub fn chat(message: &Message) -> Self {
        let payload = MessagePayload::from(message);
        match message.kind {
            MessageKind::Private => ServerEvent::PrivateMessage { message: payload },
            MessageKind::Public | MessageKind::System => ServerEvent::Message { message: payload },
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
