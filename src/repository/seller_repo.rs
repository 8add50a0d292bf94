// ==========================================
// 贷款数据带导入系统 - 卖方 / 交易 Repository
// ==========================================
// 职责: seller / trade / seller_rule 表 CRUD
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::seller::{Seller, SellerRule, Trade};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// SellerRepository Trait
// ==========================================
#[async_trait]
pub trait SellerRepository: Send + Sync {
    async fn find_seller(&self, seller_id: i64) -> RepositoryResult<Option<Seller>>;

    /// 按名称精确查找（大小写不敏感）
    async fn find_seller_by_name(&self, name: &str) -> RepositoryResult<Option<Seller>>;

    async fn list_sellers(&self) -> RepositoryResult<Vec<Seller>>;

    async fn create_seller(&self, name: &str) -> RepositoryResult<Seller>;

    async fn set_tape_password(&self, seller_id: i64, password: Option<&str>) -> RepositoryResult<()>;

    async fn find_trade(&self, trade_id: i64) -> RepositoryResult<Option<Trade>>;

    async fn find_trade_by_name(&self, seller_id: i64, name: &str) -> RepositoryResult<Option<Trade>>;

    async fn create_trade(&self, seller_id: i64, name: &str) -> RepositoryResult<Trade>;

    /// 全部规则,按 priority 升序
    async fn list_rules(&self) -> RepositoryResult<Vec<SellerRule>>;

    async fn add_rule(
        &self,
        seller_id: i64,
        sender_pattern: Option<&str>,
        subject_pattern: Option<&str>,
        priority: i32,
    ) -> RepositoryResult<i64>;
}

// ==========================================
// SellerRepositoryImpl
// ==========================================
pub struct SellerRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl SellerRepositoryImpl {
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
}

fn parse_timestamp(raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::ValidationError(format!("时间戳格式错误 {}: {}", raw, e)))
}

fn seller_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, Option<String>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_seller(raw: (i64, String, Option<String>, String)) -> RepositoryResult<Seller> {
    let (seller_id, name, tape_password, created_at) = raw;
    Ok(Seller {
        seller_id,
        name,
        tape_password,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_trade(raw: (i64, i64, String, String)) -> RepositoryResult<Trade> {
    let (trade_id, seller_id, name, created_at) = raw;
    Ok(Trade {
        trade_id,
        seller_id,
        name,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl SellerRepository for SellerRepositoryImpl {
    async fn find_seller(&self, seller_id: i64) -> RepositoryResult<Option<Seller>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT seller_id, name, tape_password, created_at FROM seller WHERE seller_id = ?1",
                params![seller_id],
                seller_from_row,
            )
            .optional()?;
        raw.map(into_seller).transpose()
    }

    async fn find_seller_by_name(&self, name: &str) -> RepositoryResult<Option<Seller>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT seller_id, name, tape_password, created_at FROM seller WHERE name = ?1 COLLATE NOCASE",
                params![name.trim()],
                seller_from_row,
            )
            .optional()?;
        raw.map(into_seller).transpose()
    }

    async fn list_sellers(&self) -> RepositoryResult<Vec<Seller>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT seller_id, name, tape_password, created_at FROM seller ORDER BY seller_id")?;
        let rows = stmt.query_map([], seller_from_row)?;

        let mut sellers = Vec::new();
        for row in rows {
            sellers.push(into_seller(row?)?);
        }
        Ok(sellers)
    }

    async fn create_seller(&self, name: &str) -> RepositoryResult<Seller> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepositoryError::ValidationError("卖方名称不能为空".to_string()));
        }

        let conn = self.lock()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO seller (name, created_at) VALUES (?1, ?2)",
            params![name, created_at.to_rfc3339()],
        )?;

        Ok(Seller {
            seller_id: conn.last_insert_rowid(),
            name: name.to_string(),
            tape_password: None,
            created_at,
        })
    }

    async fn set_tape_password(&self, seller_id: i64, password: Option<&str>) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE seller SET tape_password = ?1 WHERE seller_id = ?2",
            params![password, seller_id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Seller".to_string(),
                id: seller_id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_trade(&self, trade_id: i64) -> RepositoryResult<Option<Trade>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT trade_id, seller_id, name, created_at FROM trade WHERE trade_id = ?1",
                params![trade_id],
                trade_from_row,
            )
            .optional()?;
        raw.map(into_trade).transpose()
    }

    async fn find_trade_by_name(&self, seller_id: i64, name: &str) -> RepositoryResult<Option<Trade>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT trade_id, seller_id, name, created_at FROM trade WHERE seller_id = ?1 AND name = ?2 COLLATE NOCASE",
                params![seller_id, name.trim()],
                trade_from_row,
            )
            .optional()?;
        raw.map(into_trade).transpose()
    }

    async fn create_trade(&self, seller_id: i64, name: &str) -> RepositoryResult<Trade> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepositoryError::ValidationError("交易名称不能为空".to_string()));
        }

        let conn = self.lock()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO trade (seller_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![seller_id, name, created_at.to_rfc3339()],
        )?;

        Ok(Trade {
            trade_id: conn.last_insert_rowid(),
            seller_id,
            name: name.to_string(),
            created_at,
        })
    }

    async fn list_rules(&self) -> RepositoryResult<Vec<SellerRule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT rule_id, seller_id, sender_pattern, subject_pattern, priority
            FROM seller_rule
            ORDER BY priority ASC, rule_id ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SellerRule {
                rule_id: row.get(0)?,
                seller_id: row.get(1)?,
                sender_pattern: row.get(2)?,
                subject_pattern: row.get(3)?,
                priority: row.get(4)?,
            })
        })?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    async fn add_rule(
        &self,
        seller_id: i64,
        sender_pattern: Option<&str>,
        subject_pattern: Option<&str>,
        priority: i32,
    ) -> RepositoryResult<i64> {
        if sender_pattern.is_none() && subject_pattern.is_none() {
            return Err(RepositoryError::ValidationError(
                "规则至少需要发件人或主题模式之一".to_string(),
            ));
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO seller_rule (seller_id, sender_pattern, subject_pattern, priority) VALUES (?1, ?2, ?3, ?4)",
            params![seller_id, sender_pattern, subject_pattern, priority],
        )?;
        Ok(conn.last_insert_rowid())
    }
}
