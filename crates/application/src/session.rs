//! 会话存储
//!
//! 登录成功后签发不透明令牌，令牌空闲超过超时时间即失效。
//! 过期会话在创建、列举时顺带清理，并由后台任务周期性清扫。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use domain::{Timestamp, UserId};
use rand::distr::{Alphanumeric, SampleString};

use crate::clock::Clock;
use crate::error::ApplicationError;

/// 令牌长度
pub const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    user_id: UserId,
    username: String,
    created_at: Timestamp,
    last_access: Timestamp,
}

/// 令牌解析出的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, session: &Session, now: Timestamp) -> bool {
        now - session.last_access > self.idle_timeout
    }

    pub fn create_session(&self, user_id: UserId, username: impl Into<String>) -> String {
        let now = self.clock.now();
        let mut sessions = self.lock();
        self.sweep_locked(&mut sessions, now);

        let mut token = generate_token();
        while sessions.contains_key(&token) {
            token = generate_token();
        }
        sessions.insert(
            token.clone(),
            Session {
                user_id,
                username: username.into(),
                created_at: now,
                last_access: now,
            },
        );
        tracing::debug!(user_id = %user_id, "session created");
        token
    }

    /// 校验成功时刷新最后访问时间；过期会话在此被移除
    pub fn validate(&self, token: &str) -> bool {
        self.touch(token).is_some()
    }

    pub fn get_user(&self, token: &str) -> Result<SessionUser, ApplicationError> {
        self.touch(token).ok_or(ApplicationError::Authentication)
    }

    fn touch(&self, token: &str) -> Option<SessionUser> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let expired = match sessions.get(token) {
            None => return None,
            Some(session) => self.is_expired(session, now),
        };
        if expired {
            sessions.remove(token);
            return None;
        }
        let session = sessions.get_mut(token)?;
        session.last_access = now;
        Some(SessionUser {
            user_id: session.user_id,
            username: session.username.clone(),
        })
    }

    /// 幂等：返回令牌此前是否存在
    pub fn destroy(&self, token: &str) -> bool {
        let Some(session) = self.lock().remove(token) else {
            return false;
        };
        tracing::debug!(
            user_id = %session.user_id,
            age_secs = (self.clock.now() - session.created_at).num_seconds(),
            "session destroyed"
        );
        true
    }

    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.lock();
        self.sweep_locked(&mut sessions, now)
    }

    fn sweep_locked(&self, sessions: &mut HashMap<String, Session>, now: Timestamp) -> usize {
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    /// 当前有效会话数量，列举前先清理过期会话
    pub fn active_sessions(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.lock();
        self.sweep_locked(&mut sessions, now);
        sessions.len()
    }
}

fn generate_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LEN)
}
