// ==========================================
// 贷款数据带导入系统 - API 层
// ==========================================
// 职责: 对外入口操作,入参校验与错误转换
// ==========================================

pub mod error;
pub mod ingest_api;

pub use error::{ApiError, ApiResult};
pub use ingest_api::{parse_hint, IngestApi};
