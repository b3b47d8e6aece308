//! 单个连接的会话流水线
//!
//! 状态机：`Unauthenticated -> Authenticated -> Closed`。
//! 入站帧按到达顺序逐个处理：认证、过滤、持久化、广播、在线通知。

use std::sync::Arc;

use domain::{DomainError, MessageId, PresenceStatus, Recipient, RepositoryError, UserId};

use crate::{
    clock::Clock,
    connection::ConnectionId,
    error::ApplicationError,
    events::{ClientEvent, FrameError, ServerEvent},
    hub::{BroadcastHub, Outbound, OutboundSender},
    services::{ChatService, SendMessageRequest, UserService},
    session::SessionStore,
};

/// 所有连接共享的服务
pub struct ChatContext {
    pub sessions: Arc<SessionStore>,
    pub hub: Arc<BroadcastHub>,
    pub chat: Arc<ChatService>,
    pub users: Arc<UserService>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Unauthenticated,
    Authenticated { user_id: UserId, username: String },
    Closed,
}

/// 处理完一帧后连接是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct ChatSessionPipeline {
    id: ConnectionId,
    ctx: Arc<ChatContext>,
    state: PipelineState,
}

impl ChatSessionPipeline {
    /// 在广播中心登记连接，初始为未认证
    pub fn open(ctx: Arc<ChatContext>, sender: OutboundSender) -> Self {
        let id = ConnectionId::new();
        ctx.hub.register(id, sender);
        tracing::info!(connection_id = %id, "websocket connected");
        Self {
            id,
            ctx,
            state: PipelineState::Unauthenticated,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub async fn handle_text(&mut self, text: &str) -> Flow {
        if self.state == PipelineState::Closed {
            return Flow::Close;
        }
        match ClientEvent::decode(text) {
            Ok(event) => self.handle_event(event).await,
            Err(err) => {
                self.reject_frame(err);
                Flow::Continue
            }
        }
    }

    pub fn handle_binary(&mut self) -> Flow {
        if self.state == PipelineState::Closed {
            return Flow::Close;
        }
        self.reject_frame(FrameError::Binary);
        Flow::Continue
    }

    pub fn handle_ping(&self, payload: Vec<u8>) {
        self.ctx.hub.send_raw(self.id, Outbound::Pong(payload));
    }

    fn reject_frame(&self, err: FrameError) {
        tracing::debug!(connection_id = %self.id, error = %err, "dropping invalid frame");
        self.ctx
            .hub
            .send_to(self.id, &ServerEvent::error("invalid message format"));
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> Flow {
        let flow = match (self.state.clone(), event) {
            (PipelineState::Closed, _) => Flow::Close,
            (PipelineState::Unauthenticated, ClientEvent::Auth { token }) => {
                self.authenticate(&token).await
            }
            (PipelineState::Unauthenticated, other) => {
                tracing::debug!(connection_id = %self.id, kind = other.kind(), "event before auth");
                self.ctx
                    .hub
                    .send_to(self.id, &ServerEvent::error("authentication required"));
                Flow::Continue
            }
            (PipelineState::Authenticated { .. }, ClientEvent::Auth { .. }) => {
                self.ctx
                    .hub
                    .send_to(self.id, &ServerEvent::error("already authenticated"));
                Flow::Continue
            }
            (PipelineState::Authenticated { user_id, username }, event) => {
                self.dispatch(user_id, username, event).await;
                Flow::Continue
            }
        };
        for outcome in self.ctx.hub.prune_inactive() {
            if outcome.last_connection {
                self.ctx
                    .users
                    .mirror_status(outcome.user_id, PresenceStatus::Offline)
                    .await;
            }
        }
        flow
    }

    async fn authenticate(&mut self, token: &str) -> Flow {
        let session = match self.ctx.sessions.get_user(token) {
            Ok(session) => session,
            Err(_) => {
                tracing::warn!(connection_id = %self.id, "websocket authentication failed");
                self.ctx
                    .hub
                    .send_to(self.id, &ServerEvent::error("Authentication failed"));
                self.ctx.hub.close(self.id, "authentication failed");
                self.state = PipelineState::Closed;
                return Flow::Close;
            }
        };

        let Some(outcome) =
            self.ctx
                .hub
                .bind_identity(self.id, session.user_id, &session.username)
        else {
            self.state = PipelineState::Closed;
            return Flow::Close;
        };
        self.state = PipelineState::Authenticated {
            user_id: session.user_id,
            username: session.username.clone(),
        };
        tracing::info!(
            connection_id = %self.id,
            user_id = %session.user_id,
            first_connection = outcome.first_connection,
            devices = self.ctx.hub.presence().connection_count(session.user_id),
            "websocket authenticated"
        );

        let hub = &self.ctx.hub;
        hub.send_to(
            self.id,
            &ServerEvent::auth_success(session.user_id, session.username.clone()),
        );
        hub.broadcast(
            &ServerEvent::UserList {
                users: hub.presence().list_online_users(),
            },
            None,
        );
        if outcome.first_connection {
            hub.broadcast(
                &ServerEvent::user_joined(
                    session.username.clone(),
                    outcome.online_count,
                    self.ctx.clock.now(),
                ),
                Some(session.user_id),
            );
            self.ctx
                .users
                .mirror_status(session.user_id, PresenceStatus::Online)
                .await;
        }
        Flow::Continue
    }

    async fn dispatch(&self, user_id: UserId, username: String, event: ClientEvent) {
        let result = match event {
            ClientEvent::Chat { content } => {
                self.send_chat(user_id, username, Recipient::Public, content)
                    .await
            }
            ClientEvent::Private {
                receiver_id,
                content,
            } => {
                self.send_chat(
                    user_id,
                    username,
                    Recipient::User(UserId::new(receiver_id)),
                    content,
                )
                .await
            }
            ClientEvent::Status { status } => {
                self.update_status(user_id, status).await;
                Ok(())
            }
            ClientEvent::Recall { message_id } => {
                self.recall(user_id, MessageId::new(message_id)).await
            }
            ClientEvent::Auth { .. } => Ok(()),
        };

        if let Err(err) = result {
            match &err {
                ApplicationError::Repository(RepositoryError::Storage { .. })
                | ApplicationError::Infrastructure(_) => {
                    tracing::error!(user_id = %user_id, error = %err, "chat event failed");
                }
                _ => {
                    tracing::debug!(user_id = %user_id, error = %err, "chat event rejected");
                }
            }
            self.ctx
                .hub
                .send_to(self.id, &ServerEvent::error(err.client_message()));
        }
    }

    async fn send_chat(
        &self,
        user_id: UserId,
        username: String,
        recipient: Recipient,
        content: String,
    ) -> Result<(), ApplicationError> {
        let message = self
            .ctx
            .chat
            .send_message(SendMessageRequest {
                sender_id: user_id,
                sender_username: username,
                recipient,
                content,
            })
            .await?;

        let event = ServerEvent::chat(&message);
        let hub = &self.ctx.hub;
        match message.recipient {
            Recipient::Public => {
                let exclude = if self.ctx.chat.settings().echo_public_to_sender {
                    None
                } else {
                    Some(user_id)
                };
                let delivered = hub.broadcast(&event, exclude);
                tracing::debug!(message_id = %message.id, delivered, "public message broadcast");
            }
            Recipient::User(receiver_id) => {
                hub.send_to_user(receiver_id, &event);
                if receiver_id != user_id {
                    hub.send_to_user(user_id, &event);
                }
            }
        }
        Ok(())
    }

    async fn update_status(&self, user_id: UserId, status: PresenceStatus) {
        let hub = &self.ctx.hub;
        let Some(entry) = hub.presence().set_status(user_id, status) else {
            return;
        };
        self.ctx.users.mirror_status(user_id, status).await;
        hub.broadcast(
            &ServerEvent::StatusUpdate {
                user_id,
                username: entry.username,
                status,
            },
            None,
        );
    }

    async fn recall(&self, user_id: UserId, message_id: MessageId) -> Result<(), ApplicationError> {
        if !message_id.value().is_positive() {
            return Err(DomainError::MessageNotFound.into());
        }
        let recalled = self.ctx.chat.recall_message(user_id, message_id).await?;
        self.ctx.hub.broadcast(
            &ServerEvent::MessageRecalled {
                message_id: recalled,
            },
            None,
        );
        Ok(())
    }

    /// 连接断开时调用，可重复调用
    pub async fn close(&mut self) {
        self.state = PipelineState::Closed;
        if let Some(outcome) = self.ctx.hub.unregister(self.id) {
            if outcome.last_connection {
                self.ctx
                    .users
                    .mirror_status(outcome.user_id, PresenceStatus::Offline)
                    .await;
            }
            tracing::info!(
                connection_id = %self.id,
                user_id = %outcome.user_id,
                online_count = outcome.online_count,
                connections = self.ctx.hub.connection_count(),
                "websocket disconnected"
            );
        } else {
            tracing::debug!(connection_id = %self.id, "websocket closed");
        }
    }
}
