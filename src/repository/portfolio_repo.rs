// ==========================================
// 贷款数据带导入系统 - 资产组合 Repository Trait
// ==========================================
// 职责: 定义分组记录落库接口（不包含实现）
// 红线: 每个提交单元在一个事务内完成,失败整体回滚
// 红线: 按自然键幂等 upsert,仅插入模式下已存在身份不改写
// ==========================================

use crate::domain::records::RowRecords;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 落库作用域（卖方 / 交易）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortfolioScope {
    pub seller_id: i64,
    pub trade_id: Option<i64>,
}

/// 单行落库结果（以资产身份为准）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// 资产身份首次出现
    Created,
    /// 资产已存在且有任一分组被写入
    Updated,
    /// 资产已存在且无任何写入
    Skipped,
}

impl RowOutcome {
    /// 落库与试运行共用的判定规则
    ///
    /// # 参数
    /// - asset_exists: 资产身份在写入前已存在
    /// - update_existing: 更新模式下已存在资产总会被改写
    /// - new_child: 至少一个分组的自然键在写入前不存在
    pub fn derive(asset_exists: bool, update_existing: bool, new_child: bool) -> Self {
        if !asset_exists {
            RowOutcome::Created
        } else if update_existing || new_child {
            RowOutcome::Updated
        } else {
            RowOutcome::Skipped
        }
    }
}

/// 资产下的分组自然键（资产 ID 之外的部分）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupIdentity {
    /// 每资产一条的分组,值为表名
    PerAsset(&'static str),
    Valuation { source: String, date: NaiveDate },
    Modification { date: NaiveDate },
}

impl GroupIdentity {
    /// 行中已实例化分组的自然键
    pub fn of_row(row: &RowRecords) -> Vec<GroupIdentity> {
        let mut identities = Vec::new();
        if row.loan.is_some() {
            identities.push(GroupIdentity::PerAsset("loan"));
        }
        if row.property.is_some() {
            identities.push(GroupIdentity::PerAsset("property"));
        }
        if row.foreclosure.is_some() {
            identities.push(GroupIdentity::PerAsset("foreclosure"));
        }
        if let Some(valuation) = &row.valuation {
            identities.push(GroupIdentity::Valuation {
                source: valuation.valuation_source.clone(),
                date: valuation.valuation_date,
            });
        }
        if row.bankruptcy.is_some() {
            identities.push(GroupIdentity::PerAsset("bankruptcy"));
        }
        if let Some(modification) = &row.modification {
            identities.push(GroupIdentity::Modification {
                date: modification.modification_date,
            });
        }
        if row.special.is_some() {
            identities.push(GroupIdentity::PerAsset("special_flags"));
        }
        identities
    }
}

/// 试运行中"已假定写入"的身份,跨批次累积
#[derive(Debug, Default)]
pub struct PendingIdentities {
    assets: HashSet<String>,
    groups: HashSet<(String, GroupIdentity)>,
}

impl PendingIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_asset(&self, loan_number: &str) -> bool {
        self.assets.contains(loan_number)
    }

    pub fn has_group(&self, loan_number: &str, identity: &GroupIdentity) -> bool {
        self.groups.contains(&(loan_number.to_string(), identity.clone()))
    }

    /// 记录一行将写入的全部身份
    pub fn record(&mut self, loan_number: &str, identities: Vec<GroupIdentity>) {
        self.assets.insert(loan_number.to_string());
        for identity in identities {
            self.groups.insert((loan_number.to_string(), identity));
        }
    }
}

/// 已落库资产的摘要视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub asset_id: i64,
    pub loan_number: String,
    pub trade_id: Option<i64>,
    pub asset_type: Option<String>,
    pub current_balance: Option<String>,
    pub property_state: Option<String>,
    pub property_type: Option<String>,
}

// ==========================================
// PortfolioRepository Trait
// ==========================================
// 实现者: PortfolioRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    /// 在一个事务内 upsert 一批行
    ///
    /// # 参数
    /// - scope: 卖方 / 交易
    /// - rows: 已通过转换的行
    /// - update_existing: false 时仅插入未出现过的身份
    ///
    /// # 返回
    /// - Ok(Vec<RowOutcome>): 与 rows 一一对应
    /// - Err: 事务失败（整批回滚,无部分写入）
    async fn upsert_batch(
        &self,
        scope: PortfolioScope,
        rows: &[RowRecords],
        update_existing: bool,
    ) -> RepositoryResult<Vec<RowOutcome>>;

    /// 试运行: 只读判定一批行的落库结果
    ///
    /// 逐行探测资产与各分组的自然键,判定规则与 upsert_batch 相同（RowOutcome::derive）。
    /// pending 累积本次运行中先前行的身份,使跨批次与批内重复的判定与实际落库一致。
    ///
    /// # 参数
    /// - seller_id: None 表示占位卖方（库中不存在任何身份）
    async fn classify_batch(
        &self,
        seller_id: Option<i64>,
        rows: &[RowRecords],
        update_existing: bool,
        pending: &mut PendingIdentities,
    ) -> RepositoryResult<Vec<RowOutcome>>;

    async fn find_asset(&self, seller_id: i64, loan_number: &str) -> RepositoryResult<Option<StoredAsset>>;

    async fn count_assets(&self, seller_id: i64) -> RepositoryResult<usize>;

    async fn count_valuations(&self, seller_id: i64) -> RepositoryResult<usize>;
}
