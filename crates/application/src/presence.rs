//! 在线状态注册表
//!
//! 在线状态的唯一来源：用户在线当且仅当其存活连接集合非空。
//! 数据库中的状态列只是尽力而为的镜像。

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::{PresenceStatus, UserId};
use serde::Serialize;

use crate::connection::ConnectionId;

/// 在线用户列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
    pub id: UserId,
    pub username: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOutcome {
    /// 该用户此前没有任何存活连接
    pub first_connection: bool,
    pub online_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindOutcome {
    pub user_id: UserId,
    pub username: String,
    /// 该用户最后一个连接已断开，转为离线
    pub last_connection: bool,
    pub online_count: usize,
}

#[derive(Debug)]
struct UserPresence {
    username: String,
    status: PresenceStatus,
    connections: HashSet<ConnectionId>,
}

#[derive(Debug, Default)]
struct PresenceState {
    users: HashMap<UserId, UserPresence>,
    bindings: HashMap<ConnectionId, UserId>,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    state: RwLock<PresenceState>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, PresenceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 同一连接重复绑定到其他用户时，先解除旧绑定
    pub fn bind(
        &self,
        connection: ConnectionId,
        user_id: UserId,
        username: impl Into<String>,
    ) -> BindOutcome {
        let mut state = self.write();
        if let Some(previous) = state.bindings.get(&connection).copied() {
            if previous == user_id {
                return BindOutcome {
                    first_connection: false,
                    online_count: state.users.len(),
                };
            }
            Self::detach(&mut state, connection);
        }

        state.bindings.insert(connection, user_id);
        let username = username.into();
        let presence = state
            .users
            .entry(user_id)
            .or_insert_with(|| UserPresence {
                username: username.clone(),
                status: PresenceStatus::Online,
                connections: HashSet::new(),
            });
        let first_connection = presence.connections.is_empty();
        presence.username = username;
        presence.connections.insert(connection);

        BindOutcome {
            first_connection,
            online_count: state.users.len(),
        }
    }

    /// 未绑定的连接返回 None
    pub fn unbind(&self, connection: ConnectionId) -> Option<UnbindOutcome> {
        let mut state = self.write();
        Self::detach(&mut state, connection)
    }

    fn detach(state: &mut PresenceState, connection: ConnectionId) -> Option<UnbindOutcome> {
        let user_id = state.bindings.remove(&connection)?;
        let presence = state.users.get_mut(&user_id)?;
        presence.connections.remove(&connection);
        let username = presence.username.clone();
        let last_connection = presence.connections.is_empty();
        if last_connection {
            state.users.remove(&user_id);
        }
        Some(UnbindOutcome {
            user_id,
            username,
            last_connection,
            online_count: state.users.len(),
        })
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.read().users.contains_key(&user_id)
    }

    /// 按用户 id 排序
    pub fn list_online_users(&self) -> Vec<OnlineUser> {
        let state = self.read();
        let mut users: Vec<OnlineUser> = state
            .users
            .iter()
            .map(|(id, presence)| OnlineUser {
                id: *id,
                username: presence.username.clone(),
                status: presence.status,
            })
            .collect();
        users.sort_by_key(|user| user.id);
        users
    }

    /// 只对在线用户生效，返回更新后的条目
    pub fn set_status(&self, user_id: UserId, status: PresenceStatus) -> Option<OnlineUser> {
        let mut state = self.write();
        let presence = state.users.get_mut(&user_id)?;
        presence.status = status;
        Some(OnlineUser {
            id: user_id,
            username: presence.username.clone(),
            status,
        })
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.read()
            .users
            .get(&user_id)
            .map(|presence| presence.connections.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_device_is_not_a_first_connection() {
        let registry = PresenceRegistry::new();
        let phone = ConnectionId::new();
        let laptop = ConnectionId::new();

        let first = registry.bind(phone, UserId::new(1), "alice");
        assert!(first.first_connection);
        assert_eq!(first.online_count, 1);

        let second = registry.bind(laptop, UserId::new(1), "alice");
        assert!(!second.first_connection);
        assert_eq!(second.online_count, 1);
        assert_eq!(registry.connection_count(UserId::new(1)), 2);
    }

    #[test]
    fn only_last_unbind_goes_offline() {
        let registry = PresenceRegistry::new();
        let phone = ConnectionId::new();
        let laptop = ConnectionId::new();
        registry.bind(phone, UserId::new(1), "alice");
        registry.bind(laptop, UserId::new(1), "alice");

        let outcome = registry.unbind(phone).unwrap();
        assert!(!outcome.last_connection);
        assert!(registry.is_online(UserId::new(1)));

        let outcome = registry.unbind(laptop).unwrap();
        assert!(outcome.last_connection);
        assert_eq!(outcome.username, "alice");
        assert_eq!(outcome.online_count, 0);
        assert!(!registry.is_online(UserId::new(1)));

        assert!(registry.unbind(laptop).is_none());
    }

    #[test]
    fn list_is_sorted_and_reflects_status() {
        let registry = PresenceRegistry::new();
        registry.bind(ConnectionId::new(), UserId::new(9), "zed");
        registry.bind(ConnectionId::new(), UserId::new(2), "amy");
        assert!(registry.set_status(UserId::new(9), PresenceStatus::Busy).is_some());
        assert!(registry.set_status(UserId::new(5), PresenceStatus::Busy).is_none());

        let users = registry.list_online_users();
        assert_eq!(
            users,
            vec![
                OnlineUser {
                    id: UserId::new(2),
                    username: "amy".into(),
                    status: PresenceStatus::Online,
                },
                OnlineUser {
                    id: UserId::new(9),
                    username: "zed".into(),
                    status: PresenceStatus::Busy,
                },
            ]
        );
    }

    #[test]
    fn rebinding_connection_to_another_user_moves_it() {
        let registry = PresenceRegistry::new();
        let conn = ConnectionId::new();
        registry.bind(conn, UserId::new(1), "alice");
        registry.bind(conn, UserId::new(2), "bob");
        assert!(!registry.is_online(UserId::new(1)));
        assert!(registry.is_online(UserId::new(2)));
        assert_eq!(registry.connection_count(UserId::new(2)), 1);
    }

    #[test]
    fn concurrent_binds_keep_counts_consistent() {
        let registry = Arc::new(PresenceRegistry::new());
        let handles: Vec<_> = (1..=8)
            .map(|user| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let conns: Vec<_> = (0..50).map(|_| ConnectionId::new()).collect();
                    for conn in &conns {
                        registry.bind(*conn, UserId::new(user), format!("user{user}"));
                    }
                    let mut last = 0;
                    for conn in &conns {
                        if let Some(outcome) = registry.unbind(*conn) {
                            if outcome.last_connection {
                                last += 1;
                            }
                        }
                    }
                    last
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert!(registry.list_online_users().is_empty());
    }
}
