use std::sync::Arc;

use application::{BroadcastHub, ChatContext, ChatService, UserService};

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub hub: Arc<BroadcastHub>,
    /// 每个 WebSocket 连接的会话管线共享同一份上下文
    pub chat_context: Arc<ChatContext>,
}

impl AppState {
    pub fn new(chat_context: Arc<ChatContext>) -> Self {
        Self {
            user_service: chat_context.users.clone(),
            chat_service: chat_context.chat.clone(),
            hub: chat_context.hub.clone(),
            chat_context,
        }
    }
}
