// ==========================================
// 贷款数据带导入系统 - 导入管道错误类型
// ==========================================
// 工具: thiserror 派生宏
// 传播范围:
// - Acquisition: 单个来源（扫描继续）
// - UnresolvedSeller / AmbiguousSeller / UnreadableFile: 单个文件
// - Mapping: 仅当必填字段无任何层级可解析时致命
// - RowTransform: 单行（累计进结果,不越过行循环传播）
// - Persistence: 当前批次
// ==========================================

use crate::acquisition::mailbox::MailboxError;
use crate::config::ConfigError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入管道错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 获取 =====
    #[error("来源获取失败: {0}")]
    Acquisition(String),

    // ===== 卖方解析 =====
    #[error("无法解析卖方: {0}")]
    UnresolvedSeller(String),

    #[error("卖方匹配不唯一: {hint} 命中 {candidates:?}")]
    AmbiguousSeller { hint: String, candidates: Vec<String> },

    // ===== 文件读取 =====
    #[error("文件不可读: {0}")]
    UnreadableFile(String),

    // ===== 字段映射 =====
    #[error("字段映射失败: {0}")]
    Mapping(String),

    // ===== 行级转换 =====
    #[error("行 {row} 转换失败 (字段 {}): {message}", .field.as_deref().unwrap_or("-"))]
    RowTransform {
        row: usize,
        field: Option<String>,
        raw_value: Option<String>,
        message: String,
    },

    // ===== 落库 =====
    #[error("落库失败: {0}")]
    Persistence(String),

    // ===== 配置 =====
    #[error("配置错误: {0}")]
    Config(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ImportError {
    /// 是否只影响当前文件（而非整个调用）
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            ImportError::UnresolvedSeller(_)
                | ImportError::AmbiguousSeller { .. }
                | ImportError::UnreadableFile(_)
                | ImportError::Mapping(_)
                | ImportError::Acquisition(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::UnreadableFile(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::UnreadableFile(format!("CSV 解析失败: {}", err))
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::UnreadableFile(format!("工作簿解析失败: {}", err))
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Persistence(err.to_string())
    }
}

impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        ImportError::Persistence(err.to_string())
    }
}

impl From<ConfigError> for ImportError {
    fn from(err: ConfigError) -> Self {
        ImportError::Config(err.to_string())
    }
}

impl From<MailboxError> for ImportError {
    fn from(err: MailboxError) -> Self {
        ImportError::Acquisition(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_transform_message_names_field() {
        let err = ImportError::RowTransform {
            row: 7,
            field: Some("current_balance".to_string()),
            raw_value: Some("abc".to_string()),
            message: "无法解析为数值".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("行 7"));
        assert!(text.contains("current_balance"));
    }

    #[test]
    fn test_file_scoped_classification() {
        assert!(ImportError::UnreadableFile("x".into()).is_file_scoped());
        assert!(!ImportError::Persistence("x".into()).is_file_scoped());
    }
}
