use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;
use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

/// 用户可见的在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceStatus {
    Online,
    Busy,
    #[default]
    Offline,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Online => "ONLINE",
            PresenceStatus::Busy => "BUSY",
            PresenceStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(PresenceStatus::Online),
            "BUSY" => Ok(PresenceStatus::Busy),
            "OFFLINE" => Ok(PresenceStatus::Offline),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    /// 持久层中的状态镜像，在线状态以内存注册表为准
    pub status: PresenceStatus,
    pub created_at: Timestamp,
    pub last_seen: Timestamp,
}

/// 注册时尚未分配 id 的用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: Username,
    pub email: UserEmail,
    pub password: PasswordHash,
    pub created_at: Timestamp,
}

impl NewUser {
    pub fn register(
        username: Username,
        email: UserEmail,
        password: PasswordHash,
        now: Timestamp,
    ) -> Self {
        Self {
            username,
            email,
            password,
            created_at: now,
        }
    }

    /// 持久层分配 id 后生成完整用户
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password: self.password,
            status: PresenceStatus::Offline,
            created_at: self.created_at,
            last_seen: self.created_at,
        }
    }
}
