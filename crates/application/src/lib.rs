//! 应用层实现。
//!
//! 会话存储、在线状态注册表、广播中心与每连接的会话流水线，
//! 以及围绕领域模型的用例服务和持久化端口。

pub mod clock;
pub mod connection;
pub mod error;
pub mod events;
pub mod filter;
pub mod hub;
pub mod memory;
pub mod password;
pub mod pipeline;
pub mod presence;
pub mod repository;
pub mod services;
pub mod session;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::ConnectionId;
pub use error::ApplicationError;
pub use events::{ClientEvent, FrameError, MessagePayload, ServerEvent};
pub use filter::SharedContentFilter;
pub use hub::{BroadcastHub, Outbound, OutboundSender};
pub use password::{PasswordHasher, PasswordHasherError};
pub use pipeline::{ChatContext, ChatSessionPipeline, Flow, PipelineState};
pub use presence::{BindOutcome, OnlineUser, PresenceRegistry, UnbindOutcome};
pub use repository::{BlockRepository, MessageRepository, UserRepository};
pub use services::{
    ChatService, ChatServiceDependencies, ChatSettings, LoginRequest, LoginResult,
    RegisterUserRequest, SendMessageRequest, UserService, UserServiceDependencies,
};
pub use session::{SessionStore, SessionUser};
pub use sweeper::{spawn_retention_cleanup, spawn_session_sweeper};
