// ==========================================
// 贷款数据带导入系统 - 历史"类型"列拆分
// ==========================================
// 职责: 将通用 "Type" 列的取值按词拆分并路由到多个标准字段
// 红线: 派生值只写入空字段,显式映射列始终优先
// ==========================================

use crate::domain::records::{FieldRejection, FieldValue, RowRecordBuilder};

/// 词分隔符
const TOKEN_SEPARATORS: &[char] = &['/', ',', ';', '|'];

/// 抵押物类型词表: (输入词, 规范值)
const PROPERTY_TYPES: &[(&str, &str)] = &[
    ("SFR", "SFR"),
    ("SF", "SFR"),
    ("SINGLE FAMILY", "SFR"),
    ("CONDO", "CONDO"),
    ("CONDOMINIUM", "CONDO"),
    ("TOWNHOUSE", "TOWNHOUSE"),
    ("TOWNHOME", "TOWNHOUSE"),
    ("PUD", "PUD"),
    ("2-4 UNIT", "2-4 UNIT"),
    ("2-4", "2-4 UNIT"),
    ("MULTIFAMILY", "MULTIFAMILY"),
    ("MULTI FAMILY", "MULTIFAMILY"),
    ("MF", "MULTIFAMILY"),
    ("MANUFACTURED", "MANUFACTURED"),
    ("MH", "MANUFACTURED"),
    ("MOBILE HOME", "MANUFACTURED"),
    ("LAND", "LAND"),
    ("LOT", "LAND"),
    ("COMMERCIAL", "COMMERCIAL"),
    ("MIXED USE", "MIXED USE"),
];

const RATE_TYPES: &[(&str, &str)] = &[("ARM", "ARM"), ("FIXED", "FIXED"), ("FRM", "FIXED")];

fn lookup(table: &[(&str, &'static str)], token: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == token).map(|(_, v)| *v)
}

// ==========================================
// LegacyTypeHandler
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyTypeHandler;

impl LegacyTypeHandler {
    /// 拆分并路由,返回 (标准字段, 值) 列表
    pub fn route(&self, raw: &str) -> Vec<(&'static str, FieldValue)> {
        let mut routed = Vec::new();

        for token in raw.split(TOKEN_SEPARATORS) {
            let token = token.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
            if token.is_empty() {
                continue;
            }

            if let Some(value) = lookup(PROPERTY_TYPES, &token) {
                routed.push(("property_type", FieldValue::Text(value.to_string())));
            } else if let Some(value) = lookup(RATE_TYPES, &token) {
                routed.push(("rate_type", FieldValue::Text(value.to_string())));
            } else if token == "HELOC" {
                routed.push(("loan_type", FieldValue::Text(token.clone())));
                routed.push(("is_heloc", FieldValue::Boolean(true)));
            } else {
                // REO / NPL / RPL / PL 以及未识别的词归入资产类型
                routed.push(("asset_type", FieldValue::Text(token)));
            }
        }

        routed
    }

    /// 路由结果写入构建器（仅填充空字段）
    ///
    /// 返回实际写入的字段名。
    pub fn apply(&self, raw: &str, builder: &mut RowRecordBuilder) -> Result<Vec<&'static str>, FieldRejection> {
        let mut written = Vec::new();
        for (field, value) in self.route(raw) {
            if builder.set_if_absent(field, value)? {
                written.push(field);
            }
        }
        Ok(written)
    }
}
