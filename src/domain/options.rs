// ==========================================
// 贷款数据带导入系统 - 运行选项
// ==========================================
// 适用: ingest_file / scan_mailbox 两个入口
// ==========================================

use crate::domain::mapping::FieldMapping;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// 未匹配到卖方/交易时按名称自动创建
    pub auto_create: bool,
    pub dry_run: bool,
    /// 跳过 AI 推断（卖方与字段映射）
    pub disable_ai: bool,
    /// 工作表名称或 0 起的序号;None 取第一个
    pub sheet_selector: Option<String>,
    pub skip_rows: usize,
    pub row_limit: Option<usize>,
    /// None 时取配置项 default_batch_size
    pub batch_size: Option<usize>,
    /// false 时只插入未出现过的身份
    pub update_existing: bool,
    pub save_mapping_as: Option<String>,
    pub save_mapping_as_default: bool,
    /// 显式加载的映射配置（原样应用）
    pub mapping_artifact_id: Option<i64>,
    pub manual_mapping: Option<FieldMapping>,
    /// 解密密码,优先于卖方登记的密码
    pub password: Option<String>,
    /// 扫描模式: 附件全部下载后标记已读
    pub mark_read: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            auto_create: false,
            dry_run: false,
            disable_ai: false,
            sheet_selector: None,
            skip_rows: 0,
            row_limit: None,
            batch_size: None,
            update_existing: true,
            save_mapping_as: None,
            save_mapping_as_default: false,
            mapping_artifact_id: None,
            manual_mapping: None,
            password: None,
            mark_read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: IngestOptions = serde_json::from_str(r#"{"dry_run": true}"#).unwrap();
        assert!(options.dry_run);
        assert!(options.update_existing);
        assert!(options.batch_size.is_none());
    }
}
