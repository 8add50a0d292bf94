// ==========================================
// 贷款数据带导入系统 - 文本补全能力接口
// ==========================================
// 职责: 字段映射建议 / 卖方推断建议
// 实现者: LlmCompletionBackend（网关）;测试中使用 Mock
// 红线: 建议只是输入,是否接受由调用方按阈值与注册表裁决
// ==========================================

use crate::ai::llm_client::LlmError;
use crate::domain::field_registry::CanonicalFieldSpec;
use crate::domain::seller::SellerHint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 单列映射建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub source_column: String,
    /// None 表示模型认为该列无对应标准字段
    pub target_field: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// 卖方推断建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerSuggestion {
    pub seller_name: Option<String>,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// 为未映射列给出标准字段建议
    async fn suggest_mapping(
        &self,
        columns: &[String],
        fields: &[CanonicalFieldSpec],
    ) -> Result<Vec<MappingSuggestion>, LlmError>;

    /// 依据邮件内容从已知卖方中推断
    async fn suggest_seller(
        &self,
        hint: &SellerHint,
        known_sellers: &[String],
    ) -> Result<Option<SellerSuggestion>, LlmError>;
}
