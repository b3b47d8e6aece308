//! 广播中心
//!
//! 持有所有连接的发送队列。每个连接只有一个写任务消费自己的队列，
//! 因此同一连接上的帧按调用顺序送达。发送永远不会阻塞或向调用方报错，
//! 发送失败的连接被标记为失效，在下一次清理时移除。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::{Timestamp, UserId};
use tokio::sync::mpsc::UnboundedSender;

use crate::clock::Clock;
use crate::connection::ConnectionId;
use crate::events::ServerEvent;
use crate::presence::{BindOutcome, PresenceRegistry, UnbindOutcome};

/// 写任务消费的出站指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Arc<str>),
    Pong(Vec<u8>),
    Close(String),
}

pub type OutboundSender = UnboundedSender<Outbound>;

#[derive(Debug)]
struct ConnectionRecord {
    sender: OutboundSender,
    user: Option<(UserId, String)>,
    connected_at: Timestamp,
    active: bool,
    closing: bool,
}

#[derive(Debug, Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

pub struct BroadcastHub {
    state: RwLock<HubState>,
    presence: Arc<PresenceRegistry>,
    clock: Arc<dyn Clock>,
}

impl BroadcastHub {
    pub fn new(presence: Arc<PresenceRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            presence,
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// 新连接以未认证状态登记
    pub fn register(&self, id: ConnectionId, sender: OutboundSender) {
        let connected_at = self.clock.now();
        self.write().connections.insert(
            id,
            ConnectionRecord {
                sender,
                user: None,
                connected_at,
                active: true,
                closing: false,
            },
        );
        tracing::debug!(connection_id = %id, "connection registered");
    }

    /// 认证成功后绑定身份；未登记或正在关闭的连接返回 None。
    /// 在线绑定在持有中心写锁时完成，与 `unregister` 的关闭标记互斥。
    pub fn bind_identity(
        &self,
        id: ConnectionId,
        user_id: UserId,
        username: &str,
    ) -> Option<BindOutcome> {
        let mut state = self.write();
        let record = state.connections.get_mut(&id)?;
        if record.closing {
            return None;
        }
        let previous = record.user.replace((user_id, username.to_string()));
        if let Some((old_user, _)) = previous {
            if let Some(set) = state.by_user.get_mut(&old_user) {
                set.remove(&id);
                if set.is_empty() {
                    state.by_user.remove(&old_user);
                }
            }
        }
        state.by_user.entry(user_id).or_default().insert(id);
        Some(self.presence.bind(id, user_id, username))
    }

    /// 释放在线绑定；若这是该用户最后一个连接则广播 `user_left`，随后移除连接记录。
    /// 重复调用只有第一次生效。
    pub fn unregister(&self, id: ConnectionId) -> Option<UnbindOutcome> {
        {
            let mut state = self.write();
            let record = state.connections.get_mut(&id)?;
            if record.closing {
                return None;
            }
            record.closing = true;
            record.active = false;
        }

        let outcome = self.presence.unbind(id);
        if let Some(outcome) = &outcome {
            if outcome.last_connection {
                let event = ServerEvent::user_left(
                    outcome.username.clone(),
                    outcome.online_count,
                    self.clock.now(),
                );
                self.broadcast(&event, None);
            }
        }

        let now = self.clock.now();
        let mut state = self.write();
        if let Some(record) = state.connections.remove(&id) {
            if let Some((user_id, _)) = record.user {
                if let Some(set) = state.by_user.get_mut(&user_id) {
                    set.remove(&id);
                    if set.is_empty() {
                        state.by_user.remove(&user_id);
                    }
                }
            }
            tracing::debug!(
                connection_id = %id,
                connected_secs = (now - record.connected_at).num_seconds(),
                "connection unregistered"
            );
        }
        outcome
    }

    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) -> bool {
        match encode(event) {
            Some(text) => self.send_raw(id, Outbound::Text(text)),
            None => false,
        }
    }

    /// 发送控制帧（pong、close）或预先序列化的文本
    pub fn send_raw(&self, id: ConnectionId, outbound: Outbound) -> bool {
        let sender = {
            let state = self.read();
            match state.connections.get(&id) {
                Some(record) if record.active => record.sender.clone(),
                _ => return false,
            }
        };
        if sender.send(outbound).is_ok() {
            true
        } else {
            self.mark_inactive(&[id]);
            false
        }
    }

    /// 发送给该用户的所有存活连接，返回成功投递的连接数
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
        let Some(text) = encode(event) else {
            return 0;
        };
        let targets: Vec<(ConnectionId, OutboundSender)> = {
            let state = self.read();
            state
                .by_user
                .get(&user_id)
                .into_iter()
                .flatten()
                .filter_map(|id| {
                    let record = state.connections.get(id)?;
                    record.active.then(|| (*id, record.sender.clone()))
                })
                .collect()
        };
        self.deliver(targets, text)
    }

    /// 发送给所有已认证连接，可排除某个用户的全部连接
    pub fn broadcast(&self, event: &ServerEvent, exclude: Option<UserId>) -> usize {
        let Some(text) = encode(event) else {
            return 0;
        };
        let targets: Vec<(ConnectionId, OutboundSender)> = {
            let state = self.read();
            state
                .connections
                .iter()
                .filter(|(_, record)| record.active)
                .filter_map(|(id, record)| {
                    let (user_id, _) = record.user.as_ref()?;
                    if Some(*user_id) == exclude {
                        return None;
                    }
                    Some((*id, record.sender.clone()))
                })
                .collect()
        };
        self.deliver(targets, text)
    }

    fn deliver(&self, targets: Vec<(ConnectionId, OutboundSender)>, text: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in targets {
            if sender.send(Outbound::Text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            self.mark_inactive(&dead);
        }
        delivered
    }

    fn mark_inactive(&self, ids: &[ConnectionId]) {
        let mut state = self.write();
        for id in ids {
            if let Some(record) = state.connections.get_mut(id) {
                if record.active {
                    tracing::warn!(connection_id = %id, "send failed, marking connection inactive");
                }
                record.active = false;
            }
        }
    }

    /// 请求写任务发送关闭帧并结束
    pub fn close(&self, id: ConnectionId, reason: impl Into<String>) -> bool {
        self.send_raw(id, Outbound::Close(reason.into()))
    }

    /// 清理发送失败的连接，返回被移除连接的解绑结果。
    /// 清理过程中广播的 `user_left` 可能再发现失效连接，循环直到没有剩余。
    pub fn prune_inactive(&self) -> Vec<UnbindOutcome> {
        let mut pruned = 0;
        let mut outcomes = Vec::new();
        loop {
            let dead: Vec<ConnectionId> = {
                let state = self.read();
                state
                    .connections
                    .iter()
                    .filter(|(_, record)| !record.active && !record.closing)
                    .map(|(id, _)| *id)
                    .collect()
            };
            if dead.is_empty() {
                break;
            }
            for id in dead {
                outcomes.extend(self.unregister(id));
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::info!(pruned, "pruned dead connections");
        }
        outcomes
    }

    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }
}

fn encode(event: &ServerEvent) -> Option<Arc<str>> {
    match event.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode server event");
            None
        }
    }
}
