use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use application::{LoginRequest, MessagePayload, OnlineUser, RegisterUserRequest};
use domain::{User, UserId};

use crate::{auth::CurrentUser, error::ApiError, state::AppState, ws_connection};

#[derive(Debug, Deserialize, Validate)]
struct RegisterPayload {
    #[validate(length(min = 1, max = 50))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 6))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
struct LoginPayload {
    #[validate(length(min = 1))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    user: User,
    token: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BlockPayload {
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct BlockResponse {
    user_id: UserId,
    changed: bool,
}

#[derive(Debug, Serialize)]
struct BlockedUsersResponse {
    blocked_user_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/logout", post(logout_user))
        .route("/chat/history", get(public_history))
        .route("/chat/private/{user_id}", get(private_history))
        .route("/chat/users", get(online_users))
        .route("/chat/block", post(block_user))
        .route("/chat/unblock", post(unblock_user))
        .route("/chat/blocked", get(blocked_users))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate()?;
    let result = state
        .user_service
        .login(LoginRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok(Json(LoginResponse {
        user: result.user,
        token: result.token,
    }))
}

async fn logout_user(
    State(state): State<AppState>,
    current: CurrentUser,
) -> StatusCode {
    state.user_service.logout(&current.token).await;
    StatusCode::NO_CONTENT
}

async fn public_history(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    let messages = state
        .chat_service
        .history(current.user_id, query.limit)
        .await?;
    Ok(Json(messages.iter().map(MessagePayload::from).collect()))
}

async fn private_history(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    let messages = state
        .chat_service
        .private_history(current.user_id, UserId::new(user_id), query.limit)
        .await?;
    Ok(Json(messages.iter().map(MessagePayload::from).collect()))
}

async fn online_users(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Json<Vec<OnlineUser>> {
    Json(state.hub.presence().list_online_users())
}

async fn block_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<BlockPayload>,
) -> Result<Json<BlockResponse>, ApiError> {
    let target = UserId::new(payload.user_id);
    let changed = state.chat_service.block(current.user_id, target).await?;
    if changed {
        tracing::info!(user_id = %current.user_id, blocked_user_id = %target, "user blocked");
    }
    Ok(Json(BlockResponse {
        user_id: target,
        changed,
    }))
}

async fn unblock_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<BlockPayload>,
) -> Result<Json<BlockResponse>, ApiError> {
    let target = UserId::new(payload.user_id);
    let changed = state.chat_service.unblock(current.user_id, target).await?;
    Ok(Json(BlockResponse {
        user_id: target,
        changed,
    }))
}

async fn blocked_users(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<BlockedUsersResponse>, ApiError> {
    let blocked_user_ids = state.chat_service.blocked_users(current.user_id).await?;
    Ok(Json(BlockedUsersResponse { blocked_user_ids }))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| ws_connection::run(socket, state, query.token))
}
