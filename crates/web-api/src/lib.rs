//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的服务与会话管线。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::CurrentUser;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
