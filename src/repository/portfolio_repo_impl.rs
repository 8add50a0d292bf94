// ==========================================
// 贷款数据带导入系统 - 资产组合 Repository 实现
// ==========================================
// 职责: 分组记录的事务化 upsert（使用 rusqlite）
// 自然键:
// - asset: (seller_id, loan_number)
// - loan / property / foreclosure / bankruptcy / special_flags: asset_id
// - valuation: (asset_id, valuation_source, valuation_date)
// - modification: (asset_id, modification_date)
// 更新策略: 非空新值覆盖旧值（COALESCE）,空值不抹除已有数据
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::records::RowRecords;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::portfolio_repo::{
    GroupIdentity, PendingIdentities, PortfolioRepository, PortfolioScope, RowOutcome, StoredAsset,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};
use tracing::debug;

type Column = (&'static str, Value);

// ===== 参数转换 =====

fn text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn decimal(value: &Option<BigDecimal>) -> Value {
    value
        .as_ref()
        .map(|d| Value::Text(d.to_string()))
        .unwrap_or(Value::Null)
}

fn date(value: &Option<NaiveDate>) -> Value {
    value
        .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

fn integer(value: &Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

fn flag(value: &Option<bool>) -> Value {
    value
        .map(|b| Value::Integer(i64::from(b)))
        .unwrap_or(Value::Null)
}

// ==========================================
// PortfolioRepositoryImpl
// ==========================================
pub struct PortfolioRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl PortfolioRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在事务中 upsert 资产行
    ///
    /// # 返回
    /// - (asset_id, 是否新建)
    fn upsert_asset_tx(
        tx: &Transaction,
        scope: PortfolioScope,
        row: &RowRecords,
        update_existing: bool,
        now: &str,
    ) -> rusqlite::Result<(i64, bool)> {
        let asset = &row.asset;
        let inserted = tx.prepare_cached(
            r#"
            INSERT INTO asset (
                seller_id, trade_id, loan_number, asset_status, asset_type,
                acquisition_date, purchase_price, servicer_name, lien_position,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(seller_id, loan_number) DO NOTHING
            "#,
        )?
        .execute(params![
            scope.seller_id,
            scope.trade_id,
            row.loan_number,
            text(&asset.asset_status),
            text(&asset.asset_type),
            date(&asset.acquisition_date),
            decimal(&asset.purchase_price),
            text(&asset.servicer_name),
            integer(&asset.lien_position),
            now,
        ])?;

        if inserted > 0 {
            return Ok((tx.last_insert_rowid(), true));
        }

        let asset_id: i64 = tx.query_row(
            "SELECT asset_id FROM asset WHERE seller_id = ?1 AND loan_number = ?2",
            params![scope.seller_id, row.loan_number],
            |r| r.get(0),
        )?;

        if !update_existing {
            return Ok((asset_id, false));
        }

        tx.prepare_cached(
            r#"
            UPDATE asset SET
                trade_id = COALESCE(?2, trade_id),
                asset_status = COALESCE(?3, asset_status),
                asset_type = COALESCE(?4, asset_type),
                acquisition_date = COALESCE(?5, acquisition_date),
                purchase_price = COALESCE(?6, purchase_price),
                servicer_name = COALESCE(?7, servicer_name),
                lien_position = COALESCE(?8, lien_position),
                updated_at = ?9
            WHERE asset_id = ?1
            "#,
        )?
        .execute(params![
            asset_id,
            scope.trade_id,
            text(&asset.asset_status),
            text(&asset.asset_type),
            date(&asset.acquisition_date),
            decimal(&asset.purchase_price),
            text(&asset.servicer_name),
            integer(&asset.lien_position),
            now,
        ])?;

        Ok((asset_id, false))
    }

    /// 在事务中 upsert 一个分组记录
    ///
    /// # 返回
    /// - true: 插入或更新了一行
    /// - false: 仅插入模式下身份已存在
    fn upsert_group_tx(
        tx: &Transaction,
        table: &str,
        keys: Vec<Column>,
        columns: Vec<Column>,
        update_existing: bool,
        now: &str,
    ) -> rusqlite::Result<bool> {
        let key_names: Vec<&str> = keys.iter().map(|(name, _)| *name).collect();
        let mut names: Vec<&str> = key_names.clone();
        let mut values: Vec<Value> = keys.into_iter().map(|(_, v)| v).collect();
        for (name, value) in &columns {
            names.push(*name);
            values.push(value.clone());
        }
        names.push("updated_at");
        values.push(Value::Text(now.to_string()));

        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let action = if update_existing {
            let mut sets: Vec<String> = columns
                .iter()
                .map(|(name, _)| format!("{name} = COALESCE(excluded.{name}, {table}.{name})"))
                .collect();
            sets.push("updated_at = excluded.updated_at".to_string());
            format!("DO UPDATE SET {}", sets.join(", "))
        } else {
            "DO NOTHING".to_string()
        };

        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT({}) {action}",
            names.join(", "),
            placeholders.join(", "),
            key_names.join(", "),
        );

        let changed = tx.prepare_cached(&sql)?.execute(params_from_iter(values.iter()))?;
        Ok(changed > 0)
    }

    /// 在事务中写入单行的全部分组
    fn upsert_row_tx(
        tx: &Transaction,
        scope: PortfolioScope,
        row: &RowRecords,
        update_existing: bool,
        now: &str,
    ) -> rusqlite::Result<RowOutcome> {
        let (asset_id, created) = Self::upsert_asset_tx(tx, scope, row, update_existing, now)?;
        let id = || vec![("asset_id", Value::Integer(asset_id))];
        let mut wrote_child = false;

        if let Some(loan) = &row.loan {
            wrote_child |= Self::upsert_group_tx(
                tx,
                "loan",
                id(),
                vec![
                    ("original_balance", decimal(&loan.original_balance)),
                    ("current_balance", decimal(&loan.current_balance)),
                    ("interest_rate", decimal(&loan.interest_rate)),
                    ("origination_date", date(&loan.origination_date)),
                    ("maturity_date", date(&loan.maturity_date)),
                    ("next_due_date", date(&loan.next_due_date)),
                    ("paid_through_date", date(&loan.paid_through_date)),
                    ("monthly_payment", decimal(&loan.monthly_payment)),
                    ("escrow_balance", decimal(&loan.escrow_balance)),
                    ("deferred_balance", decimal(&loan.deferred_balance)),
                    ("loan_type", text(&loan.loan_type)),
                    ("rate_type", text(&loan.rate_type)),
                ],
                update_existing,
                now,
            )?;
        }

        if let Some(property) = &row.property {
            wrote_child |= Self::upsert_group_tx(
                tx,
                "property",
                id(),
                vec![
                    ("property_address", text(&property.property_address)),
                    ("property_city", text(&property.property_city)),
                    ("property_state", text(&property.property_state)),
                    ("property_zip", text(&property.property_zip)),
                    ("property_county", text(&property.property_county)),
                    ("property_type", text(&property.property_type)),
                    ("year_built", integer(&property.year_built)),
                    ("square_feet", integer(&property.square_feet)),
                    ("occupancy", text(&property.occupancy)),
                ],
                update_existing,
                now,
            )?;
        }

        if let Some(fc) = &row.foreclosure {
            wrote_child |= Self::upsert_group_tx(
                tx,
                "foreclosure",
                id(),
                vec![
                    ("fc_status", text(&fc.fc_status)),
                    ("fc_referral_date", date(&fc.fc_referral_date)),
                    ("fc_first_legal_date", date(&fc.fc_first_legal_date)),
                    ("fc_sale_date", date(&fc.fc_sale_date)),
                    ("fc_attorney", text(&fc.fc_attorney)),
                ],
                update_existing,
                now,
            )?;
        }

        if let Some(valuation) = &row.valuation {
            let mut keys = id();
            keys.push(("valuation_source", Value::Text(valuation.valuation_source.clone())));
            keys.push(("valuation_date", date(&Some(valuation.valuation_date))));
            wrote_child |= Self::upsert_group_tx(
                tx,
                "valuation",
                keys,
                vec![("valuation_value", decimal(&valuation.valuation_value))],
                update_existing,
                now,
            )?;
        }

        if let Some(bk) = &row.bankruptcy {
            wrote_child |= Self::upsert_group_tx(
                tx,
                "bankruptcy",
                id(),
                vec![
                    ("bk_chapter", integer(&bk.bk_chapter)),
                    ("bk_filing_date", date(&bk.bk_filing_date)),
                    ("bk_case_number", text(&bk.bk_case_number)),
                    ("bk_discharge_date", date(&bk.bk_discharge_date)),
                    ("bk_dismissal_date", date(&bk.bk_dismissal_date)),
                ],
                update_existing,
                now,
            )?;
        }

        if let Some(modification) = &row.modification {
            let mut keys = id();
            keys.push(("modification_date", date(&Some(modification.modification_date))));
            wrote_child |= Self::upsert_group_tx(
                tx,
                "modification",
                keys,
                vec![
                    ("modification_type", text(&modification.modification_type)),
                    ("modified_rate", decimal(&modification.modified_rate)),
                    ("modified_balance", decimal(&modification.modified_balance)),
                    ("modified_maturity_date", date(&modification.modified_maturity_date)),
                ],
                update_existing,
                now,
            )?;
        }

        if let Some(special) = &row.special {
            wrote_child |= Self::upsert_group_tx(
                tx,
                "special_flags",
                id(),
                vec![
                    ("is_heloc", flag(&special.is_heloc)),
                    ("in_litigation", flag(&special.in_litigation)),
                    ("in_forbearance", flag(&special.in_forbearance)),
                ],
                update_existing,
                now,
            )?;
        }

        Ok(RowOutcome::derive(!created, update_existing, wrote_child))
    }

    /// 在只读事务中探测分组自然键是否已存在
    fn group_exists(tx: &Transaction, asset_id: i64, identity: &GroupIdentity) -> rusqlite::Result<bool> {
        match identity {
            GroupIdentity::PerAsset(table) => tx
                .prepare_cached(&format!("SELECT 1 FROM {table} WHERE asset_id = ?1 LIMIT 1"))?
                .exists(params![asset_id]),
            GroupIdentity::Valuation { source, date: day } => tx
                .prepare_cached(
                    "SELECT 1 FROM valuation WHERE asset_id = ?1 AND valuation_source = ?2 AND valuation_date = ?3 LIMIT 1",
                )?
                .exists(params![asset_id, source, date(&Some(*day))]),
            GroupIdentity::Modification { date: day } => tx
                .prepare_cached(
                    "SELECT 1 FROM modification WHERE asset_id = ?1 AND modification_date = ?2 LIMIT 1",
                )?
                .exists(params![asset_id, date(&Some(*day))]),
        }
    }
}

#[async_trait]
impl PortfolioRepository for PortfolioRepositoryImpl {
    /// 批量 upsert（事务化）
    async fn upsert_batch(
        &self,
        scope: PortfolioScope,
        rows: &[RowRecords],
        update_existing: bool,
    ) -> RepositoryResult<Vec<RowOutcome>> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let outcome = Self::upsert_row_tx(&tx, scope, row, update_existing, &now).map_err(|e| {
                RepositoryError::DatabaseTransactionError(format!(
                    "行 {} (loan_number={}) 写入失败: {}",
                    row.row_number, row.loan_number, e
                ))
            })?;
            outcomes.push(outcome);
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        debug!(seller_id = scope.seller_id, rows = rows.len(), "批次提交完成");
        Ok(outcomes)
    }

    async fn classify_batch(
        &self,
        seller_id: Option<i64>,
        rows: &[RowRecords],
        update_existing: bool,
        pending: &mut PendingIdentities,
    ) -> RepositoryResult<Vec<RowOutcome>> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let asset_id: Option<i64> = match seller_id {
                Some(seller_id) => tx
                    .prepare_cached("SELECT asset_id FROM asset WHERE seller_id = ?1 AND loan_number = ?2")?
                    .query_row(params![seller_id, row.loan_number], |r| r.get(0))
                    .optional()?,
                None => None,
            };
            let asset_exists = asset_id.is_some() || pending.has_asset(&row.loan_number);

            let identities = GroupIdentity::of_row(row);
            let mut new_child = false;
            for identity in &identities {
                if pending.has_group(&row.loan_number, identity) {
                    continue;
                }
                let stored = match asset_id {
                    Some(asset_id) => Self::group_exists(&tx, asset_id, identity)?,
                    None => false,
                };
                if !stored {
                    new_child = true;
                    break;
                }
            }

            outcomes.push(RowOutcome::derive(asset_exists, update_existing, new_child));
            pending.record(&row.loan_number, identities);
        }

        tx.rollback()?;
        Ok(outcomes)
    }

    async fn find_asset(&self, seller_id: i64, loan_number: &str) -> RepositoryResult<Option<StoredAsset>> {
        let conn = self.lock()?;
        let asset = conn
            .query_row(
                r#"
                SELECT a.asset_id, a.loan_number, a.trade_id, a.asset_type,
                       l.current_balance, p.property_state, p.property_type
                FROM asset a
                LEFT JOIN loan l ON l.asset_id = a.asset_id
                LEFT JOIN property p ON p.asset_id = a.asset_id
                WHERE a.seller_id = ?1 AND a.loan_number = ?2
                "#,
                params![seller_id, loan_number],
                |row| {
                    Ok(StoredAsset {
                        asset_id: row.get(0)?,
                        loan_number: row.get(1)?,
                        trade_id: row.get(2)?,
                        asset_type: row.get(3)?,
                        current_balance: row.get(4)?,
                        property_state: row.get(5)?,
                        property_type: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(asset)
    }

    async fn count_assets(&self, seller_id: i64) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM asset WHERE seller_id = ?1",
            params![seller_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn count_valuations(&self, seller_id: i64) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM valuation v
            JOIN asset a ON a.asset_id = v.asset_id
            WHERE a.seller_id = ?1
            "#,
            params![seller_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
