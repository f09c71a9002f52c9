//! PostgreSQL 连接管理

use dlmp_errors::{AppError, AppResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::PostgresConfig;

/// 创建 PostgreSQL 连接池
pub async fn create_pool(config: &PostgresConfig) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_max)
        .min_connections(config.pool_min)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(&config.connection_url())
        .await
        .map_err(|e| AppError::database(format!("Failed to create pool: {}", e)))?;

    info!(
        max_connections = config.pool_max,
        min_connections = config.pool_min,
        "PostgreSQL connection pool created"
    );
    Ok(pool)
}

/// 检查数据库连接
pub async fn check_connection(pool: &PgPool) -> AppResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| AppError::database(format!("Database health check failed: {}", e)))?;
    Ok(())
}
