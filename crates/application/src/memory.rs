//! 内存版持久化实现，用于测试和无数据库的本地运行

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use domain::{
    BlockRelation, Message, MessageId, MessageKind, NewMessage, NewUser, PresenceStatus,
    RepositoryError, Timestamp, User, UserEmail, UserId, Username,
};
use tokio::sync::RwLock;

use crate::repository::{BlockRepository, MessageRepository, UserRepository};

#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
    next_id: AtomicI64,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let duplicate = users
            .values()
            .any(|existing| existing.username == user.username || existing.email == user.email);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        let id = UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let stored = user.into_user(id);
        users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| &user.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn update_status(
        &self,
        id: UserId,
        status: PresenceStatus,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.status = status;
        user.last_seen = at;
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryMessageRepository {
    messages: RwLock<BTreeMap<MessageId, Message>>,
    next_id: AtomicI64,
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self {
            messages: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含已删除消息的总数
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

/// 取最新的 `limit` 条并按时间升序返回
fn newest_ascending<'a>(messages: impl Iterator<Item = &'a Message>, limit: u32) -> Vec<Message> {
    let mut selected: Vec<Message> = messages.cloned().collect();
    selected.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
    selected.truncate(limit as usize);
    selected.reverse();
    selected
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let stored = message.into_message(id);
        self.messages.write().await.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn recent_public(&self, limit: u32) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(newest_ascending(
            messages
                .values()
                .filter(|m| m.kind == MessageKind::Public && !m.is_deleted),
            limit,
        ))
    }

    async fn private_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(newest_ascending(
            messages.values().filter(|m| {
                m.kind == MessageKind::Private
                    && !m.is_deleted
                    && ((m.sender_id == a && m.recipient.user() == Some(b))
                        || (m.sender_id == b && m.recipient.user() == Some(a)))
            }),
            limit,
        ))
    }

    async fn delete_message(
        &self,
        id: MessageId,
        requester: UserId,
        at: Timestamp,
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        match messages.get_mut(&id) {
            Some(message) if message.sender_id == requester && !message.is_deleted => {
                message.mark_deleted(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cleanup_older_than(&self, cutoff: Timestamp) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|_, message| message.created_at >= cutoff);
        Ok((before - messages.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockRepository {
    relations: RwLock<BTreeSet<(UserId, UserId)>>,
}

impl InMemoryBlockRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockRepository for InMemoryBlockRepository {
    async fn block(&self, relation: BlockRelation) -> Result<bool, RepositoryError> {
        Ok(self
            .relations
            .write()
            .await
            .insert((relation.user_id, relation.blocked_user_id)))
    }

    async fn unblock(
        &self,
        user_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .relations
            .write()
            .await
            .remove(&(user_id, blocked_user_id)))
    }

    async fn blocked_users(&self, user_id: UserId) -> Result<Vec<UserId>, RepositoryError> {
        Ok(self
            .relations
            .read()
            .await
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, blocked)| *blocked)
            .collect())
    }
}
