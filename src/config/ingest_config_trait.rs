// ==========================================
// 贷款数据带导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的运行期参数读取接口
// 实现者: ConfigManager（config_kv 表）
// ==========================================

use crate::config::config_manager::ConfigError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;

// ==========================================
// IngestConfigReader Trait
// ==========================================
#[async_trait]
pub trait IngestConfigReader: Send + Sync {
    /// AI 建议（字段映射 / 卖方推断）的最低接受置信度
    ///
    /// # 默认值
    /// - 0.75（低于该值的建议被拒绝,落入下一层级）
    async fn get_ai_confidence_threshold(&self) -> Result<f32, ConfigError>;

    /// AI 调用的最大尝试次数（默认 3）
    async fn get_ai_max_attempts(&self) -> Result<u32, ConfigError>;

    /// 邮箱 API 调用的最大尝试次数（默认 3）
    async fn get_mailbox_max_attempts(&self) -> Result<u32, ConfigError>;

    /// 重试退避基数（毫秒,默认 200）
    async fn get_retry_backoff_ms(&self) -> Result<u64, ConfigError>;

    /// 每个提交单元的行数（默认 500）
    async fn get_default_batch_size(&self) -> Result<usize, ConfigError>;

    /// 结果中保留的错误明细上限（默认 100）
    async fn get_max_reported_errors(&self) -> Result<usize, ConfigError>;

    /// 是否全局启用 AI 层级（默认 true）
    async fn get_ai_enabled(&self) -> Result<bool, ConfigError>;

    /// AI 调用重试策略
    async fn ai_retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.get_ai_max_attempts().await?,
            self.get_retry_backoff_ms().await?,
        ))
    }

    /// 邮箱调用重试策略
    async fn mailbox_retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.get_mailbox_max_attempts().await?,
            self.get_retry_backoff_ms().await?,
        ))
    }
}
