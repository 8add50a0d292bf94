// ==========================================
// 贷款数据带导入系统 - 运行台账 Repository
// ==========================================
// 职责: import_run 表写入 / 查询（仅非试运行写入）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import_result::ImportBatchResult;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 台账记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRunRecord {
    pub run_id: String,
    pub file_name: String,
    pub seller_id: Option<i64>,
    pub trade_id: Option<i64>,
    pub state: String,
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
    pub error_count: i64,
    pub result_json: String,
}

// ==========================================
// ImportRunRepository Trait
// ==========================================
#[async_trait]
pub trait ImportRunRepository: Send + Sync {
    async fn record_run(&self, result: &ImportBatchResult, started_at: DateTime<Utc>) -> RepositoryResult<()>;

    async fn get_run(&self, run_id: &str) -> RepositoryResult<Option<ImportRunRecord>>;

    async fn count_runs(&self) -> RepositoryResult<usize>;
}

pub struct ImportRunRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepositoryImpl {
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

#[async_trait]
impl ImportRunRepository for ImportRunRepositoryImpl {
    async fn record_run(&self, result: &ImportBatchResult, started_at: DateTime<Utc>) -> RepositoryResult<()> {
        if result.dry_run {
            return Err(RepositoryError::ValidationError(
                "试运行不写入运行台账".to_string(),
            ));
        }

        let result_json = serde_json::to_string(result)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO import_run (
                run_id, file_name, seller_id, trade_id, state, total_rows,
                created, updated, skipped, error_count, failed_batches,
                result_json, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                result.run_id,
                result.file_name,
                result.seller_id,
                result.trade_id,
                result.state.to_string(),
                result.total_rows as i64,
                result.created as i64,
                result.updated as i64,
                result.skipped as i64,
                result.error_count as i64,
                result.failed_batches as i64,
                result_json,
                started_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> RepositoryResult<Option<ImportRunRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT run_id, file_name, seller_id, trade_id, state,
                       created, updated, skipped, error_count, result_json
                FROM import_run WHERE run_id = ?1
                "#,
                params![run_id],
                |row| {
                    Ok(ImportRunRecord {
                        run_id: row.get(0)?,
                        file_name: row.get(1)?,
                        seller_id: row.get(2)?,
                        trade_id: row.get(3)?,
                        state: row.get(4)?,
                        created: row.get(5)?,
                        updated: row.get(6)?,
                        skipped: row.get(7)?,
                        error_count: row.get(8)?,
                        result_json: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn count_runs(&self) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM import_run", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
