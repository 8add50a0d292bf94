// ==========================================
// 贷款数据带导入系统 - 仓储聚合
// ==========================================
// 职责: 聚合导入管道所需的 Repository,共享同一数据库连接
// ==========================================

use crate::repository::import_run_repo::ImportRunRepositoryImpl;
use crate::repository::mapping_artifact_repo::MappingArtifactRepositoryImpl;
use crate::repository::portfolio_repo_impl::PortfolioRepositoryImpl;
use crate::repository::seller_repo::SellerRepositoryImpl;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// 导入管道仓储集合
#[derive(Clone)]
pub struct IngestRepositories {
    conn: Arc<Mutex<Connection>>,
    /// 卖方 / 交易 / 规则
    pub seller_repo: Arc<SellerRepositoryImpl>,
    /// 映射配置
    pub artifact_repo: Arc<MappingArtifactRepositoryImpl>,
    /// 运行台账
    pub run_repo: Arc<ImportRunRepositoryImpl>,
}

impl IngestRepositories {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            seller_repo: Arc::new(SellerRepositoryImpl::from_connection(conn.clone())),
            artifact_repo: Arc::new(MappingArtifactRepositoryImpl::from_connection(conn.clone())),
            run_repo: Arc::new(ImportRunRepositoryImpl::from_connection(conn.clone())),
            conn,
        }
    }

    /// 资产组合仓储（导入器独占持有）
    pub fn portfolio_repo(&self) -> PortfolioRepositoryImpl {
        PortfolioRepositoryImpl::from_connection(self.conn.clone())
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}
