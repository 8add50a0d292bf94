// ==========================================
// 贷款数据带导入系统 - 原始表格数据集
// ==========================================
// 用途: 文件解析产物（字节 → 统一的有序行/列表示）
// 红线: 空单元格统一为 None,不得写入 "missing" 之类的字面量
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// SourceMetadata - 来源元信息
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub file_name: String,
    /// 工作簿实际读取的工作表（分隔文本为 None）
    pub sheet: Option<String>,
    /// 分隔文本命中的解码器名称（工作簿为 None）
    pub detected_encoding: Option<String>,
    /// 容器格式: "workbook" / "delimited"
    pub format: String,
}

// ==========================================
// RawTabularRow - 原始行
// ==========================================
// cells 与 RawTabularDataset.columns 按位置对齐
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTabularRow {
    /// 源文件中的物理行号（1 起,含表头与跳过行）
    pub row_number: usize,
    pub cells: Vec<Option<String>>,
}

impl RawTabularRow {
    pub fn cell(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).and_then(|c| c.as_deref())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.is_none())
    }
}

// ==========================================
// RawTabularDataset - 原始数据集
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTabularDataset {
    pub columns: Vec<String>,
    pub rows: Vec<RawTabularRow>,
    pub metadata: SourceMetadata,
}

impl RawTabularDataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 按列名取值（有序映射语义）
    pub fn value<'a>(&self, row: &'a RawTabularRow, column: &str) -> Option<&'a str> {
        self.column_index(column).and_then(|idx| row.cell(idx))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lookup_by_column() {
        let dataset = RawTabularDataset {
            columns: vec!["Loan Number".to_string(), "State".to_string()],
            rows: vec![RawTabularRow {
                row_number: 2,
                cells: vec![Some("L-1".to_string()), None],
            }],
            metadata: SourceMetadata::default(),
        };

        let row = &dataset.rows[0];
        assert_eq!(dataset.value(row, "Loan Number"), Some("L-1"));
        assert_eq!(dataset.value(row, "State"), None);
        assert_eq!(dataset.value(row, "Missing"), None);
        assert!(!row.is_blank());
    }
}
