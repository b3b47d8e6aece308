//! `Authorization: Bearer <token>` 认证提取器

use application::SessionUser;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use domain::UserId;

use crate::{error::ApiError, state::AppState};

/// 已通过会话令牌认证的调用者
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub username: String,
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(ApiError::unauthorized)?;
        let SessionUser { user_id, username } = state
            .user_service
            .authenticate(token)
            .map_err(|_| ApiError::unauthorized())?;

        Ok(CurrentUser {
            user_id,
            username,
            token: token.to_owned(),
        })
    }
}
