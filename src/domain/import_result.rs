// ==========================================
// 贷款数据带导入系统 - 导入结果
// ==========================================
// 用途: 单个文件一次运行的结构化汇总（唯一对外契约）
// 红线: 即使部分失败也必须返回结构化结果,不得丢弃已完成进度
// ==========================================

use crate::domain::mapping::ColumnResolution;
use crate::domain::types::RunState;
use serde::{Deserialize, Serialize};

/// 错误明细默认上限
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 100;

// ==========================================
// RowError - 行级错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 源文件物理行号
    pub row_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,
    pub message: String,
}

// ==========================================
// ImportBatchResult - 运行汇总
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatchResult {
    pub run_id: String,
    pub file_name: String,
    pub seller_id: Option<i64>,
    pub seller_name: Option<String>,
    pub trade_id: Option<i64>,
    pub dry_run: bool,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    // ===== 计数 =====
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub error_count: usize,
    pub failed_batches: usize,

    // ===== 明细 =====
    /// 行级错误（至多 max_reported_errors 条,error_count 为真实总数）
    pub errors: Vec<RowError>,
    pub warnings: Vec<String>,
    pub unmapped_columns: Vec<String>,
    pub column_resolutions: Vec<ColumnResolution>,

    // ===== 来源信息 =====
    pub sheet: Option<String>,
    pub detected_encoding: Option<String>,
    pub mapping_artifact_id: Option<i64>,
    pub elapsed_ms: u64,

    #[serde(skip)]
    max_errors: usize,
}

impl ImportBatchResult {
    pub fn new(run_id: &str, file_name: &str, dry_run: bool, max_errors: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            file_name: file_name.to_string(),
            seller_id: None,
            seller_name: None,
            trade_id: None,
            dry_run,
            state: RunState::Idle,
            failure: None,
            total_rows: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            error_count: 0,
            failed_batches: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            unmapped_columns: Vec::new(),
            column_resolutions: Vec::new(),
            sheet: None,
            detected_encoding: None,
            mapping_artifact_id: None,
            elapsed_ms: 0,
            max_errors,
        }
    }

    /// 记录行级错误（计数不受上限约束,明细截断）
    pub fn record_error(&mut self, error: RowError) {
        self.error_count += 1;
        if self.errors.len() < self.max_errors {
            self.errors.push(error);
        }
    }

    /// 记录整批落库失败（批内每行计为错误,明细只保留一条）
    pub fn record_batch_failure(&mut self, first_row: usize, last_row: usize, rows: usize, message: &str) {
        self.failed_batches += 1;
        self.error_count += rows;
        if self.errors.len() < self.max_errors {
            self.errors.push(RowError {
                row_number: first_row,
                field: None,
                raw_value: None,
                message: format!("批次 (行 {}-{}) 落库失败,已回滚: {}", first_row, last_row, message),
            });
        }
    }

    /// 终止为失败状态
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = RunState::Failed;
        self.failure = Some(reason.into());
    }

    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }

    /// 实际处理（成功 + 跳过 + 失败）的行数
    pub fn processed_rows(&self) -> usize {
        self.created + self.updated + self.skipped + self.error_count
    }
}
