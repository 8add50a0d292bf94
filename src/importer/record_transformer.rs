// ==========================================
// 贷款数据带导入系统 - 行记录转换器
// ==========================================
// 流程: 应用映射 → 按值类型转换 → 历史"类型"列拆分 → 分组构建
// 红线: 任一值转换失败或分组标识缺失,整行失败并记录行号与原始值
// 红线: 行级失败以数据形式返回,不中断所在批次
// ==========================================

use crate::domain::dataset::{RawTabularDataset, RawTabularRow};
use crate::domain::field_registry::FieldRegistry;
use crate::domain::import_result::RowError;
use crate::domain::mapping::FieldMapping;
use crate::domain::records::{RowRecordBuilder, RowRecords};
use crate::domain::types::FieldValueType;
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::legacy_type::LegacyTypeHandler;
use std::sync::Arc;

/// 已映射列: 数据集列位置 → 标准字段
#[derive(Debug, Clone)]
struct PlannedColumn {
    index: usize,
    field: String,
    value_type: FieldValueType,
}

/// 针对某个数据集与映射预先计算的转换计划
#[derive(Debug, Clone)]
pub struct TransformPlan {
    columns: Vec<PlannedColumn>,
}

impl TransformPlan {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// ImportError::RowTransform → 结果中的行级错误
pub fn to_row_error(err: ImportError, row_number: usize) -> RowError {
    match err {
        ImportError::RowTransform {
            row,
            field,
            raw_value,
            message,
        } => RowError {
            row_number: row,
            field,
            raw_value,
            message,
        },
        other => RowError {
            row_number,
            field: None,
            raw_value: None,
            message: other.to_string(),
        },
    }
}

pub struct RecordTransformer {
    registry: Arc<FieldRegistry>,
    cleaner: DataCleaner,
    legacy: LegacyTypeHandler,
}

impl RecordTransformer {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self {
            registry,
            cleaner: DataCleaner,
            legacy: LegacyTypeHandler,
        }
    }

    /// 计算转换计划（映射目标必须在注册表中）
    pub fn plan(&self, dataset: &RawTabularDataset, mapping: &FieldMapping) -> ImportResult<TransformPlan> {
        let mut columns = Vec::new();
        for (source, target) in mapping.mapped() {
            let spec = self.registry.get(target).ok_or_else(|| {
                ImportError::Mapping(format!("映射目标 '{}' 不在标准字段注册表中", target))
            })?;
            if let Some(index) = dataset.column_index(source) {
                columns.push(PlannedColumn {
                    index,
                    field: spec.name.clone(),
                    value_type: spec.value_type,
                });
            }
        }
        Ok(TransformPlan { columns })
    }

    /// 转换单行
    pub fn transform_row(&self, plan: &TransformPlan, row: &RawTabularRow) -> ImportResult<RowRecords> {
        let row_number = row.row_number;
        let mut builder = RowRecordBuilder::new();
        let mut legacy_values: Vec<&str> = Vec::new();

        for column in &plan.columns {
            let Some(raw) = row.cell(column.index) else {
                continue;
            };

            let value = self
                .cleaner
                .coerce(column.value_type, raw)
                .map_err(|e| ImportError::RowTransform {
                    row: row_number,
                    field: Some(column.field.clone()),
                    raw_value: Some(raw.to_string()),
                    message: e.to_string(),
                })?;
            let Some(value) = value else {
                continue;
            };

            if column.value_type == FieldValueType::LegacyType {
                legacy_values.push(raw);
                continue;
            }

            builder
                .set(&column.field, value)
                .map_err(|rejection| ImportError::RowTransform {
                    row: row_number,
                    field: Some(column.field.clone()),
                    raw_value: Some(raw.to_string()),
                    message: rejection.to_string(),
                })?;
        }

        // 显式映射值已写入,派生值只填空
        for raw in legacy_values {
            self.legacy
                .apply(raw, &mut builder)
                .map_err(|rejection| ImportError::RowTransform {
                    row: row_number,
                    field: Some("legacy_type".to_string()),
                    raw_value: Some(raw.to_string()),
                    message: rejection.to_string(),
                })?;
        }

        builder.build(row_number).map_err(|e| {
            let raw_value = plan
                .columns
                .iter()
                .find(|c| c.field == e.field)
                .and_then(|c| row.cell(c.index))
                .map(|v| v.to_string());
            ImportError::RowTransform {
                row: row_number,
                field: Some(e.field),
                raw_value,
                message: e.message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::SourceMetadata;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn dataset(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> RawTabularDataset {
        RawTabularDataset {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, cells)| RawTabularRow {
                    row_number: i + 2,
                    cells: cells.into_iter().map(|c| c.map(|v| v.to_string())).collect(),
                })
                .collect(),
            metadata: SourceMetadata::default(),
        }
    }

    fn mapping(pairs: &[(&str, Option<&str>)]) -> FieldMapping {
        let mut mapping = FieldMapping::new();
        for (source, target) in pairs {
            mapping.set(source, target.map(|t| t.to_string()));
        }
        mapping
    }

    #[test]
    fn test_transform_partitions_into_groups() {
        let transformer = RecordTransformer::new(Arc::new(FieldRegistry::standard()));
        let data = dataset(
            &["Loan", "UPB", "ST", "Type", "Notes"],
            vec![vec![Some("L-1"), Some("$1,234.50"), Some("CA"), Some("SFR/ARM"), Some("x")]],
        );
        let map = mapping(&[
            ("Loan", Some("loan_number")),
            ("UPB", Some("current_balance")),
            ("ST", Some("property_state")),
            ("Type", Some("legacy_type")),
            ("Notes", None),
        ]);

        let plan = transformer.plan(&data, &map).unwrap();
        assert_eq!(plan.len(), 4);
        let records = transformer.transform_row(&plan, &data.rows[0]).unwrap();

        assert_eq!(records.loan_number, "L-1");
        let loan = records.loan.unwrap();
        assert_eq!(loan.current_balance, Some(BigDecimal::from_str("1234.50").unwrap()));
        assert_eq!(loan.rate_type.as_deref(), Some("ARM"));
        let property = records.property.unwrap();
        assert_eq!(property.property_state.as_deref(), Some("CA"));
        assert_eq!(property.property_type.as_deref(), Some("SFR"));
    }

    #[test]
    fn test_coercion_failure_names_field_and_raw_value() {
        let transformer = RecordTransformer::new(Arc::new(FieldRegistry::standard()));
        let data = dataset(&["Loan", "UPB"], vec![vec![Some("L-1"), Some("lots")]]);
        let map = mapping(&[("Loan", Some("loan_number")), ("UPB", Some("current_balance"))]);
        let plan = transformer.plan(&data, &map).unwrap();

        let err = transformer.transform_row(&plan, &data.rows[0]).unwrap_err();
        let row_error = to_row_error(err, 0);
        assert_eq!(row_error.row_number, 2);
        assert_eq!(row_error.field.as_deref(), Some("current_balance"));
        assert_eq!(row_error.raw_value.as_deref(), Some("lots"));
    }

    #[test]
    fn test_missing_identity_fails_row() {
        let transformer = RecordTransformer::new(Arc::new(FieldRegistry::standard()));
        let data = dataset(&["Loan", "UPB"], vec![vec![None, Some("100")]]);
        let map = mapping(&[("Loan", Some("loan_number")), ("UPB", Some("current_balance"))]);
        let plan = transformer.plan(&data, &map).unwrap();

        let err = transformer.transform_row(&plan, &data.rows[0]).unwrap_err();
        assert!(matches!(err, ImportError::RowTransform { row: 2, .. }));
    }

    #[test]
    fn test_plan_rejects_unknown_target() {
        let transformer = RecordTransformer::new(Arc::new(FieldRegistry::standard()));
        let data = dataset(&["Loan"], vec![]);
        let map = mapping(&[("Loan", Some("not_a_field"))]);
        assert!(matches!(transformer.plan(&data, &map), Err(ImportError::Mapping(_))));
    }
}
