//! 进程运行时初始化

use dlmp_config::AppConfig;
use dlmp_errors::{AppError, AppResult};
use dlmp_telemetry::{PrometheusHandle, init_metrics, init_tracing, init_tracing_json};
use tracing::info;

use crate::Infrastructure;

/// 运行时配置
pub struct RuntimeConfig {
    pub config_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_dir: "config".to_string(),
        }
    }
}

/// 初始化日志
///
/// 生产环境或显式开启 `telemetry.json` 时输出 JSON。
/// 重复初始化（例如测试中）返回配置错误。
pub fn init_runtime(config: &AppConfig) -> AppResult<()> {
    let result = if config.is_production() || config.telemetry.json {
        init_tracing_json(&config.telemetry.log_level)
    } else {
        init_tracing(&config.telemetry.log_level)
    };
    result.map_err(|e| AppError::configuration(format!("tracing init failed: {}", e)))?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Runtime initialized"
    );
    Ok(())
}

/// 安装 Prometheus 指标记录器，返回的句柄用于渲染抓取内容
pub fn init_metrics_recorder() -> AppResult<PrometheusHandle> {
    init_metrics().map_err(|e| AppError::configuration(format!("metrics init failed: {}", e)))
}

/// 加载配置、初始化日志并装配基础设施
pub async fn start(runtime: RuntimeConfig) -> AppResult<Infrastructure> {
    let config = AppConfig::load(&runtime.config_dir)
        .map_err(|e| AppError::configuration(e.to_string()))?;
    init_runtime(&config)?;
    Infrastructure::from_config(config).await
}
