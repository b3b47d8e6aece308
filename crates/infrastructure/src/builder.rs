use std::sync::Arc;

use config::{DatabaseConfig, SecurityConfig};
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 连接数据库、执行迁移后得到的持久化适配器集合
#[derive(Clone)]
pub struct Infrastructure {
    pub storage: Arc<PgStorage>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
}

impl Infrastructure {
    pub async fn connect(
        database: &DatabaseConfig,
        security: &SecurityConfig,
    ) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&database.url, database.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = database.max_connections, "database ready");

        Ok(Self {
            storage: Arc::new(PgStorage::new(pool)),
            password_hasher: Arc::new(BcryptPasswordHasher::new(security.bcrypt_cost)),
        })
    }
}
