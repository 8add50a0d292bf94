// ==========================================
// 贷款数据带导入系统 - 配置层
// ==========================================
// 职责: 运行期参数管理（阈值 / 重试 / 批大小）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod ingest_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigError, ConfigManager};
pub use ingest_config_trait::IngestConfigReader;
