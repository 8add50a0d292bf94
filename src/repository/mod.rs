// ==========================================
// 贷款数据带导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod import_run_repo;
pub mod mapping_artifact_repo;
pub mod portfolio_repo;
pub mod portfolio_repo_impl;
pub mod seller_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_run_repo::{ImportRunRecord, ImportRunRepository, ImportRunRepositoryImpl};
pub use mapping_artifact_repo::{MappingArtifactRepository, MappingArtifactRepositoryImpl};
pub use portfolio_repo::{
    GroupIdentity, PendingIdentities, PortfolioRepository, PortfolioScope, RowOutcome, StoredAsset,
};
pub use portfolio_repo_impl::PortfolioRepositoryImpl;
pub use seller_repo::{SellerRepository, SellerRepositoryImpl};
