//! Redis 连接管理
//!
//! 单机使用 `ConnectionManager`（断线自动重连），集群使用 `ClusterConnection`。
//! 两者都可廉价克隆，由 `RedisConnection` 统一成同一种命令通道。

use dlmp_errors::{AppError, AppResult};
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{Client, Cmd, Pipeline, RedisFuture, Value};
use tracing::info;

use crate::config::{RedisConfig, RedisMode};

/// 单机或集群连接
#[derive(Clone)]
pub enum RedisConnection {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

impl RedisConnection {
    pub fn mode(&self) -> RedisMode {
        match self {
            Self::Standalone(_) => RedisMode::Standalone,
            Self::Cluster(_) => RedisMode::Cluster,
        }
    }
}

impl ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Standalone(conn) => conn.req_packed_command(cmd),
            Self::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Standalone(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Standalone(conn) => conn.get_db(),
            Self::Cluster(conn) => conn.get_db(),
        }
    }
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RedisConnection").field(&self.mode()).finish()
    }
}

/// 创建 Redis 连接管理器
pub async fn create_connection_manager(url: &str) -> AppResult<ConnectionManager> {
    let client = Client::open(url)
        .map_err(|e| AppError::configuration(format!("Invalid Redis URL: {}", e)))?;

    ConnectionManager::new(client).await.map_err(|e| {
        AppError::external_service(format!("Failed to create Redis connection manager: {}", e))
    })
}

/// 创建集群连接
pub async fn create_cluster_connection(nodes: &[String]) -> AppResult<ClusterConnection> {
    if nodes.is_empty() {
        return Err(AppError::configuration("Cluster nodes cannot be empty"));
    }

    let client = ClusterClient::new(nodes.to_vec())
        .map_err(|e| AppError::configuration(format!("Failed to create cluster client: {}", e)))?;

    client.get_async_connection().await.map_err(|e| {
        AppError::external_service(format!("Failed to get cluster connection: {}", e))
    })
}

/// 按配置建立连接（单次尝试，带连接超时）
pub async fn connect(config: &RedisConfig) -> AppResult<RedisConnection> {
    let connecting = async {
        match config.mode {
            RedisMode::Standalone => create_connection_manager(&config.url)
                .await
                .map(RedisConnection::Standalone),
            RedisMode::Cluster => create_cluster_connection(&config.cluster_nodes)
                .await
                .map(RedisConnection::Cluster),
        }
    };

    let conn = tokio::time::timeout(config.connection_timeout, connecting)
        .await
        .map_err(|_| {
            AppError::timeout(format!(
                "Redis connection timed out after {}ms",
                config.connection_timeout.as_millis()
            ))
        })??;

    info!(
        mode = ?config.mode,
        nodes = config.cluster_nodes.len(),
        "Redis connection established"
    );
    Ok(conn)
}

/// 检查 Redis 连接
pub async fn check_connection(conn: &mut RedisConnection) -> AppResult<()> {
    redis::cmd("PING")
        .query_async::<String>(conn)
        .await
        .map_err(|e| AppError::external_service(format!("Redis health check failed: {}", e)))?;
    Ok(())
}
