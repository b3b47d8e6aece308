use std::sync::Arc;

use domain::{DomainError, NewUser, PresenceStatus, RepositoryError, User, UserEmail, UserId, Username};

use crate::{
    clock::Clock,
    error::ApplicationError,
    password::{check_password_policy, PasswordHasher},
    repository::UserRepository,
    session::{SessionStore, SessionUser},
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: User,
    pub token: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionStore>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        if request.username.trim().is_empty()
            || request.email.trim().is_empty()
            || request.password.is_empty()
        {
            return Err(ApplicationError::validation(
                "username, email and password are required",
            ));
        }
        let username = Username::parse(request.username)?;
        let email = UserEmail::parse(request.email)?;
        check_password_policy(&request.password)?;

        let repo = &self.deps.user_repository;
        if repo.find_by_username(&username).await?.is_some()
            || repo.find_by_email(&email).await?.is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let new_user = NewUser::register(username, email, password_hash, self.deps.clock.now());

        // 并发注册时由唯一约束兜底
        let stored = repo.create(new_user).await.map_err(|err| match err {
            RepositoryError::Conflict => ApplicationError::Domain(DomainError::UserAlreadyExists),
            other => other.into(),
        })?;
        tracing::info!(user_id = %stored.id, username = %stored.username, "user registered");
        Ok(stored)
    }

    /// 用户名不存在与密码错误返回同样的认证失败
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResult, ApplicationError> {
        let username =
            Username::parse(request.username).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        let token = self
            .deps
            .sessions
            .create_session(user.id, user.username.as_str());
        self.mirror_status(user.id, PresenceStatus::Online).await;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok(LoginResult { user, token })
    }

    /// 幂等：返回令牌此前是否有效
    pub async fn logout(&self, token: &str) -> bool {
        let session = self.deps.sessions.get_user(token).ok();
        let existed = self.deps.sessions.destroy(token);
        if let Some(session) = session {
            self.mirror_status(session.user_id, PresenceStatus::Offline)
                .await;
            tracing::info!(user_id = %session.user_id, "user logged out");
        }
        existed
    }

    pub fn authenticate(&self, token: &str) -> Result<SessionUser, ApplicationError> {
        self.deps.sessions.get_user(token)
    }

    pub async fn find_user(&self, id: UserId) -> Result<Option<User>, ApplicationError> {
        Ok(self.deps.user_repository.find_by_id(id).await?)
    }

    /// 把在线状态写入持久层镜像，失败只记录日志
    pub async fn mirror_status(&self, user_id: UserId, status: PresenceStatus) {
        if let Err(err) = self
            .deps
            .user_repository
            .update_status(user_id, status, self.deps.clock.now())
            .await
        {
            tracing::warn!(user_id = %user_id, status = %status, error = %err, "failed to mirror user status");
        }
    }
}
