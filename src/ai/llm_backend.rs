// ==========================================
// 贷款数据带导入系统 - 网关补全后端
// ==========================================
// 职责: 构造提示词 → 调用网关 → 解析 JSON 建议
// ==========================================

use crate::ai::completion::{CompletionBackend, MappingSuggestion, SellerSuggestion};
use crate::ai::llm_client::{LlmClient, LlmError, LlmMessage};
use crate::domain::field_registry::CanonicalFieldSpec;
use crate::domain::seller::SellerHint;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// 邮件正文截断长度（字符）
const BODY_PROMPT_LIMIT: usize = 2000;

const MAPPING_SYSTEM_PROMPT: &str = "You map spreadsheet column headers from loan tapes to a canonical schema. \
Answer with JSON only: {\"mappings\":[{\"source_column\":\"...\",\"target_field\":\"<canonical name or null>\",\"confidence\":0.0-1.0}]}. \
Use only canonical names from the list. Use null when no field fits.";

const SELLER_SYSTEM_PROMPT: &str = "You identify which loan seller sent an email carrying a loan tape. \
Answer with JSON only: {\"seller_name\":\"<one of the known sellers or null>\",\"trade_name\":\"<trade or null>\",\"confidence\":0.0-1.0}.";

#[derive(Debug, Deserialize)]
struct MappingPayload {
    mappings: Vec<MappingSuggestion>,
}

/// 去除 ``` 代码块包裹
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().trim_end_matches("```").trim()
}

pub(crate) fn build_mapping_prompt(columns: &[String], fields: &[CanonicalFieldSpec]) -> String {
    let mut prompt = String::from("Canonical fields:\n");
    for field in fields {
        prompt.push_str(&format!(
            "- {} ({}, {}): {}\n",
            field.name, field.group, field.value_type, field.description
        ));
    }
    prompt.push_str("\nColumns to map:\n");
    for column in columns {
        prompt.push_str(&format!("- {}\n", column));
    }
    prompt
}

pub(crate) fn build_seller_prompt(hint: &SellerHint, known_sellers: &[String]) -> String {
    let body: String = hint
        .body
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(BODY_PROMPT_LIMIT)
        .collect();
    format!(
        "Known sellers: {}\nFrom: {}\nSubject: {}\nBody:\n{}",
        known_sellers.join(", "),
        hint.sender.as_deref().unwrap_or(""),
        hint.subject.as_deref().unwrap_or(""),
        body
    )
}

pub(crate) fn parse_mapping_response(text: &str) -> Result<Vec<MappingSuggestion>, LlmError> {
    let payload: MappingPayload = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| LlmError::InvalidResponse(format!("映射建议 JSON 解析失败: {}", e)))?;
    Ok(payload.mappings)
}

pub(crate) fn parse_seller_response(text: &str) -> Result<Option<SellerSuggestion>, LlmError> {
    let suggestion: SellerSuggestion = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| LlmError::InvalidResponse(format!("卖方建议 JSON 解析失败: {}", e)))?;
    Ok(suggestion.seller_name.is_some().then_some(suggestion))
}

// ==========================================
// LlmCompletionBackend
// ==========================================
pub struct LlmCompletionBackend {
    client: LlmClient,
}

impl LlmCompletionBackend {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionBackend for LlmCompletionBackend {
    async fn suggest_mapping(
        &self,
        columns: &[String],
        fields: &[CanonicalFieldSpec],
    ) -> Result<Vec<MappingSuggestion>, LlmError> {
        let messages = [
            LlmMessage::system(MAPPING_SYSTEM_PROMPT),
            LlmMessage::user(build_mapping_prompt(columns, fields)),
        ];
        let text = self.client.chat(&messages).await?;
        debug!(columns = columns.len(), "收到映射建议");
        parse_mapping_response(&text)
    }

    async fn suggest_seller(
        &self,
        hint: &SellerHint,
        known_sellers: &[String],
    ) -> Result<Option<SellerSuggestion>, LlmError> {
        let messages = [
            LlmMessage::system(SELLER_SYSTEM_PROMPT),
            LlmMessage::user(build_seller_prompt(hint, known_sellers)),
        ];
        let text = self.client.chat(&messages).await?;
        parse_seller_response(&text)
    }
}
