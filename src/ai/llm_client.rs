// ==========================================
// 贷款数据带导入系统 - 语言模型网关客户端
// ==========================================
// 协议: POST {gateway}/inference,可选 X-API-Key 头
// 配置: TAPE_LLM_GATEWAY_URL / TAPE_LLM_API_KEY / TAPE_LLM_MODEL
//       TAPE_LLM_FUNCTION / TAPE_LLM_TIMEOUT_SECS
// ==========================================

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::TransientError;

const DEFAULT_FUNCTION: &str = "tape_ingest";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub function_name: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// 从环境变量读取;未配置网关地址时返回 None（AI 层级不可用）
    pub fn from_env() -> Option<Self> {
        let gateway_url = std::env::var("TAPE_LLM_GATEWAY_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Some(Self {
            gateway_url,
            api_key: std::env::var("TAPE_LLM_API_KEY").ok(),
            function_name: std::env::var("TAPE_LLM_FUNCTION").ok(),
            model: std::env::var("TAPE_LLM_MODEL").ok(),
            timeout_secs: std::env::var("TAPE_LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("未配置模型网关地址")]
    MissingGateway,
    #[error("网关请求失败: {0}")]
    Http(String),
    #[error("网关返回 HTTP {0}")]
    Status(u16),
    #[error("模型响应无效: {0}")]
    InvalidResponse(String),
}

impl TransientError for LlmError {
    /// 传输失败、限流与 5xx 可重试
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Status(code) => *code == 429 || *code >= 500,
            LlmError::MissingGateway | LlmError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(config.timeout_secs),
            config,
        }
    }

    /// 发送对话,返回首个文本内容块
    pub async fn chat(&self, messages: &[LlmMessage]) -> Result<String, LlmError> {
        let gateway = self.config.gateway_url.trim().trim_end_matches('/');
        if gateway.is_empty() {
            return Err(LlmError::MissingGateway);
        }

        let body = ChatRequest {
            function_name: self
                .config
                .function_name
                .clone()
                .unwrap_or_else(|| DEFAULT_FUNCTION.to_string()),
            model_name: self.config.model.clone(),
            input: ChatInput {
                messages: messages.to_vec(),
            },
        };

        let mut request = self.http.post(format!("{gateway}/inference")).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }

        let payload: InferenceResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        payload
            .content
            .into_iter()
            .find(|item| item.r#type == "text")
            .map(|item| item.text)
            .ok_or_else(|| LlmError::InvalidResponse("响应中缺少文本内容".into()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    input: ChatInput,
}

#[derive(Debug, Serialize)]
struct ChatInput {
    messages: Vec<LlmMessage>,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    r#type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_gateway_is_rejected_before_request() {
        let client = LlmClient::new(LlmConfig {
            gateway_url: "  ".to_string(),
            api_key: None,
            function_name: None,
            model: None,
            timeout_secs: 1,
        });
        let result = client.chat(&[LlmMessage::user("hi")]).await;
        assert!(matches!(result, Err(LlmError::MissingGateway)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Http("connection reset".into()).is_transient());
        assert!(LlmError::Status(503).is_transient());
        assert!(LlmError::Status(429).is_transient());
        assert!(!LlmError::Status(401).is_transient());
        assert!(!LlmError::MissingGateway.is_transient());
        assert!(!LlmError::InvalidResponse("not json".into()).is_transient());
    }

    #[test]
    fn test_response_text_block_parsing() {
        let raw = r#"{"content":[{"type":"thought"},{"type":"text","text":"{\"ok\":true}"}]}"#;
        let payload: InferenceResponse = serde_json::from_str(raw).unwrap();
        let text = payload.content.into_iter().find(|c| c.r#type == "text").unwrap().text;
        assert_eq!(text, "{\"ok\":true}");
    }
}
