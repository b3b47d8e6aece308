use sqlx::migrate::Migrator;

/// 仓库根目录下的 SQL 迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
