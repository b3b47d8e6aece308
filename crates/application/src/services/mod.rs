mod chat_service;
mod user_service;

pub use chat_service::{ChatService, ChatServiceDependencies, ChatSettings, SendMessageRequest};
pub use user_service::{
    LoginRequest, LoginResult, RegisterUserRequest, UserService, UserServiceDependencies,
};
