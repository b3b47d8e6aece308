//! 后台周期任务：会话过期清扫、消息保留期清理。
//! 两者使用独立的定时器，与请求处理互不影响。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::services::ChatService;
use crate::session::SessionStore;

pub fn spawn_session_sweeper(sessions: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.sweep_expired();
            if removed > 0 {
                tracing::info!(
                    removed,
                    active = sessions.active_sessions(),
                    "expired sessions swept"
                );
            }
        }
    })
}

pub fn spawn_retention_cleanup(chat: Arc<ChatService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match chat.cleanup_expired_messages().await {
                Ok(removed) => tracing::info!(removed, "expired messages cleaned up"),
                Err(err) => tracing::error!(error = %err, "message retention cleanup failed"),
            }
        }
    })
}
