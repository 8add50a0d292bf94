// ==========================================
// 贷款数据带导入系统 - 引擎层
// ==========================================
// 职责: 卖方解析与单次运行编排
// 红线: 引擎不拼 SQL,数据访问全部经由 Repository
// ==========================================

pub mod orchestrator;
pub mod repositories;
pub mod seller_resolver;

// 重导出核心引擎
pub use orchestrator::IngestOrchestrator;
pub use repositories::IngestRepositories;
pub use seller_resolver::{ResolvePolicy, SellerResolver, SellerResolverImpl};
