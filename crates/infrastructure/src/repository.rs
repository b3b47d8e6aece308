use application::repository::{BlockRepository, MessageRepository, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    BlockRelation, Message, MessageId, MessageKind, NewMessage, NewUser, PasswordHash,
    PresenceStatus, Recipient, RepositoryError, Timestamp, User, UserEmail, UserId, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    status: String,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username =
            Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let email = UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let password = PasswordHash::new(value.password_hash)
            .map_err(|err| invalid_data(err.to_string()))?;
        let status = value
            .status
            .parse::<PresenceStatus>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::new(value.id),
            username,
            email,
            password,
            status,
            created_at: value.created_at,
            last_seen: value.last_seen,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    sender_id: i64,
    sender_username: String,
    receiver_id: Option<i64>,
    content: String,
    original_content: String,
    message_type: String,
    created_at: DateTime<Utc>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let kind =
            MessageKind::parse(&value.message_type).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::new(value.id),
            sender_id: UserId::new(value.sender_id),
            sender_username: value.sender_username,
            recipient: Recipient::from_column(value.receiver_id),
            content: value.content,
            original_content: value.original_content,
            kind,
            created_at: value.created_at,
            is_deleted: value.is_deleted,
            deleted_at: value.deleted_at,
        })
    }
}

fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>, RepositoryError> {
    // 查询按时间倒序取最新的 N 条，这里翻转为升序
    records.into_iter().rev().map(Message::try_from).collect()
}

const USER_COLUMNS: &str = "id, username, email, password_hash, status, created_at, last_seen";
const MESSAGE_COLUMNS: &str = "id, sender_id, sender_username, receiver_id, content, \
     original_content, message_type, created_at, is_deleted, deleted_at";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, status, created_at, last_seen) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user.username.as_str())
            .bind(user.email.as_str())
            .bind(user.password.as_str())
            .bind(PresenceStatus::Offline.as_str())
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        self.find_one("username", username.as_str()).await
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        self.find_one("email", email.as_str()).await
    }

    async fn update_status(
        &self,
        id: UserId,
        status: PresenceStatus,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET status = $2, last_seen = $3 WHERE id = $1")
            .bind(id.value())
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let sql = format!(
            "INSERT INTO messages \
             (sender_id, sender_username, receiver_id, content, original_content, message_type, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MESSAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message.sender_id.value())
            .bind(&message.sender_username)
            .bind(message.recipient.as_column())
            .bind(message.content.as_str())
            .bind(&message.original_content)
            .bind(message.kind.as_str())
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Message::try_from)
            .transpose()
    }

    async fn recent_public(&self, limit: u32) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE message_type = 'PUBLIC' AND is_deleted = FALSE \
             ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn private_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE message_type = 'PRIVATE' AND is_deleted = FALSE \
               AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)) \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(a.value())
            .bind(b.value())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn delete_message(
        &self,
        id: MessageId,
        requester: UserId,
        at: Timestamp,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE messages SET is_deleted = TRUE, deleted_at = $3 \
             WHERE id = $1 AND sender_id = $2 AND is_deleted = FALSE",
        )
        .bind(id.value())
        .bind(requester.value())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn cleanup_older_than(&self, cutoff: Timestamp) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn block(&self, relation: BlockRelation) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO user_blocks (user_id, blocked_user_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, blocked_user_id) DO NOTHING",
        )
        .bind(relation.user_id.value())
        .bind(relation.blocked_user_id.value())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn unblock(
        &self,
        user_id: UserId,
        blocked_user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM user_blocks WHERE user_id = $1 AND blocked_user_id = $2")
                .bind(user_id.value())
                .bind(blocked_user_id.value())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn blocked_users(&self, user_id: UserId) -> Result<Vec<UserId>, RepositoryError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT blocked_user_id FROM user_blocks WHERE user_id = $1 ORDER BY blocked_user_id",
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(|(id,)| UserId::new(id)).collect())
    }
}

/// 三个仓储共享同一个连接池
#[derive(Clone)]
pub struct PgStorage {
    pub user_repository: PgUserRepository,
    pub message_repository: PgMessageRepository,
    pub block_repository: PgBlockRepository,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: PgUserRepository::new(pool.clone()),
            message_repository: PgMessageRepository::new(pool.clone()),
            block_repository: PgBlockRepository::new(pool),
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message_record(id: i64, receiver_id: Option<i64>, message_type: &str) -> MessageRecord {
        MessageRecord {
            id,
            sender_id: 1,
            sender_username: "alice".into(),
            receiver_id,
            content: "hi".into(),
            original_content: "hi".into(),
            message_type: message_type.into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    #[test]
    fn descending_rows_come_back_ascending() {
        let messages = into_messages(vec![
            message_record(3, None, "PUBLIC"),
            message_record(2, Some(7), "PRIVATE"),
            message_record(1, None, "PUBLIC"),
        ])
        .unwrap();

        let ids: Vec<i64> = messages.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(messages[1].recipient, Recipient::User(UserId::new(7)));
        assert_eq!(messages[1].kind, MessageKind::Private);
    }

    #[test]
    fn unknown_enum_values_are_storage_errors() {
        let err = Message::try_from(message_record(1, None, "SHOUT")).unwrap_err();
        assert!(matches!(err, RepositoryError::Storage { .. }));

        let record = UserRecord {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$04$hash".into(),
            status: "AWAY".into(),
            created_at: Utc::now(),
            last_seen: Utc::now(),
        };
        assert!(matches!(
            User::try_from(record),
            Err(RepositoryError::Storage { .. })
        ));
    }
}
