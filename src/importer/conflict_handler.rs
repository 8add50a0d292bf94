// ==========================================
// 贷款数据带导入系统 - 重复标识检测
// ==========================================
// 职责: 检测同文件内重复资产标识
// 策略: 同文件重复仅告警,落库按行粒度后写入者为准
// ==========================================

use crate::domain::records::RowRecords;
use std::collections::HashMap;

/// 同文件重复: 后出现行与首次出现行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateIdentity {
    pub row_number: usize,
    pub loan_number: String,
    pub first_row: usize,
}

impl DuplicateIdentity {
    pub fn warning(&self) -> String {
        format!(
            "行 {} 的资产 {} 与行 {} 重复,按后出现者为准",
            self.row_number, self.loan_number, self.first_row
        )
    }
}

#[derive(Debug, Default)]
pub struct ConflictHandler {
    first_occurrence: HashMap<String, usize>,
}

impl ConflictHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 逐批登记,返回本批中重复先前行的记录（跨批次持续累计）
    pub fn detect_duplicates(&mut self, records: &[RowRecords]) -> Vec<DuplicateIdentity> {
        let mut duplicates = Vec::new();
        for record in records {
            match self.first_occurrence.get(&record.loan_number) {
                Some(&first_row) => duplicates.push(DuplicateIdentity {
                    row_number: record.row_number,
                    loan_number: record.loan_number.clone(),
                    first_row,
                }),
                None => {
                    self.first_occurrence
                        .insert(record.loan_number.clone(), record.row_number);
                }
            }
        }
        duplicates
    }

}
