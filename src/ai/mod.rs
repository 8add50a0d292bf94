// ==========================================
// 贷款数据带导入系统 - AI 推断层
// ==========================================
// 职责: 字段映射与卖方推断的可替换补全后端
// ==========================================

pub mod completion;
pub mod llm_backend;
pub mod llm_client;

pub use completion::{CompletionBackend, MappingSuggestion, SellerSuggestion};
pub use llm_backend::LlmCompletionBackend;
pub use llm_client::{LlmClient, LlmConfig, LlmError, LlmMessage};
