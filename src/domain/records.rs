// ==========================================
// 贷款数据带导入系统 - 目标记录分组
// ==========================================
// 用途: 单行数据按分组拆分后的强类型记录（落库前的中间产物）
// 红线: 构建器只接受已知字段名,其余一律拒绝并上报
// 红线: 一行在每个分组内至多产生一条记录
// ==========================================

use crate::domain::types::TargetGroup;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

/// 估值来源缺省值（数据带自带估值）
pub const DEFAULT_VALUATION_SOURCE: &str = "TAPE";

// ==========================================
// FieldValue - 类型转换后的字段值
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(BigDecimal),
    Date(NaiveDate),
    Boolean(bool),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Date(_) => "date",
            FieldValue::Boolean(_) => "boolean",
        }
    }

    fn into_text(self, field: &str) -> Result<String, FieldRejection> {
        match self {
            FieldValue::Text(v) => Ok(v),
            other => Err(FieldRejection::type_mismatch(field, "text", other.kind())),
        }
    }

    fn into_decimal(self, field: &str) -> Result<BigDecimal, FieldRejection> {
        match self {
            FieldValue::Decimal(v) => Ok(v),
            FieldValue::Integer(v) => Ok(BigDecimal::from(v)),
            other => Err(FieldRejection::type_mismatch(field, "decimal", other.kind())),
        }
    }

    fn into_integer(self, field: &str) -> Result<i64, FieldRejection> {
        match self {
            FieldValue::Integer(v) => Ok(v),
            other => Err(FieldRejection::type_mismatch(field, "integer", other.kind())),
        }
    }

    fn into_date(self, field: &str) -> Result<NaiveDate, FieldRejection> {
        match self {
            FieldValue::Date(v) => Ok(v),
            other => Err(FieldRejection::type_mismatch(field, "date", other.kind())),
        }
    }

    fn into_bool(self, field: &str) -> Result<bool, FieldRejection> {
        match self {
            FieldValue::Boolean(v) => Ok(v),
            other => Err(FieldRejection::type_mismatch(field, "boolean", other.kind())),
        }
    }
}

// ==========================================
// FieldRejection - 构建器拒绝原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRejection {
    UnknownField(String),
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl FieldRejection {
    fn type_mismatch(field: &str, expected: &'static str, actual: &'static str) -> Self {
        FieldRejection::TypeMismatch {
            field: field.to_string(),
            expected,
            actual,
        }
    }
}

impl std::fmt::Display for FieldRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRejection::UnknownField(name) => write!(f, "未知字段: {}", name),
            FieldRejection::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "字段 {} 类型不匹配: 期望 {}, 实际 {}", field, expected, actual),
        }
    }
}

// ==========================================
// 分组记录
// ==========================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetRecord {
    pub asset_status: Option<String>,
    pub asset_type: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub purchase_price: Option<BigDecimal>,
    pub servicer_name: Option<String>,
    pub lien_position: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanRecord {
    pub original_balance: Option<BigDecimal>,
    pub current_balance: Option<BigDecimal>,
    pub interest_rate: Option<BigDecimal>,
    pub origination_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub paid_through_date: Option<NaiveDate>,
    pub monthly_payment: Option<BigDecimal>,
    pub escrow_balance: Option<BigDecimal>,
    pub deferred_balance: Option<BigDecimal>,
    pub loan_type: Option<String>,
    pub rate_type: Option<String>,
}

impl LoanRecord {
    fn is_empty(&self) -> bool {
        *self == LoanRecord::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyRecord {
    pub property_address: Option<String>,
    pub property_city: Option<String>,
    pub property_state: Option<String>,
    pub property_zip: Option<String>,
    pub property_county: Option<String>,
    pub property_type: Option<String>,
    pub year_built: Option<i64>,
    pub square_feet: Option<i64>,
    pub occupancy: Option<String>,
}

impl PropertyRecord {
    fn is_empty(&self) -> bool {
        *self == PropertyRecord::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeclosureRecord {
    pub fc_status: Option<String>,
    pub fc_referral_date: Option<NaiveDate>,
    pub fc_first_legal_date: Option<NaiveDate>,
    pub fc_sale_date: Option<NaiveDate>,
    pub fc_attorney: Option<String>,
}

impl ForeclosureRecord {
    fn is_empty(&self) -> bool {
        *self == ForeclosureRecord::default()
    }
}

/// 估值记录,自然键 (资产, 来源, 生效日)
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationRecord {
    pub valuation_source: String,
    pub valuation_date: NaiveDate,
    pub valuation_value: Option<BigDecimal>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BankruptcyRecord {
    pub bk_chapter: Option<i64>,
    pub bk_filing_date: Option<NaiveDate>,
    pub bk_case_number: Option<String>,
    pub bk_discharge_date: Option<NaiveDate>,
    pub bk_dismissal_date: Option<NaiveDate>,
}

impl BankruptcyRecord {
    fn is_empty(&self) -> bool {
        *self == BankruptcyRecord::default()
    }
}

/// 贷款修改记录,自然键 (资产, 修改生效日)
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationRecord {
    pub modification_date: NaiveDate,
    pub modification_type: Option<String>,
    pub modified_rate: Option<BigDecimal>,
    pub modified_balance: Option<BigDecimal>,
    pub modified_maturity_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialRecord {
    pub is_heloc: Option<bool>,
    pub in_litigation: Option<bool>,
    pub in_forbearance: Option<bool>,
}

impl SpecialRecord {
    fn is_empty(&self) -> bool {
        *self == SpecialRecord::default()
    }
}

// ==========================================
// RowRecords - 单行拆分结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecords {
    pub row_number: usize,
    /// 资产自然键（卖方内唯一）
    pub loan_number: String,
    pub asset: AssetRecord,
    pub loan: Option<LoanRecord>,
    pub property: Option<PropertyRecord>,
    pub foreclosure: Option<ForeclosureRecord>,
    pub valuation: Option<ValuationRecord>,
    pub bankruptcy: Option<BankruptcyRecord>,
    pub modification: Option<ModificationRecord>,
    pub special: Option<SpecialRecord>,
}

impl RowRecords {
    /// 本行实例化的分组
    pub fn groups(&self) -> Vec<TargetGroup> {
        let mut groups = vec![TargetGroup::Asset];
        if self.loan.is_some() {
            groups.push(TargetGroup::Loan);
        }
        if self.property.is_some() {
            groups.push(TargetGroup::Property);
        }
        if self.foreclosure.is_some() {
            groups.push(TargetGroup::Foreclosure);
        }
        if self.valuation.is_some() {
            groups.push(TargetGroup::Valuation);
        }
        if self.bankruptcy.is_some() {
            groups.push(TargetGroup::Bankruptcy);
        }
        if self.modification.is_some() {
            groups.push(TargetGroup::Modification);
        }
        if self.special.is_some() {
            groups.push(TargetGroup::Special);
        }
        groups
    }
}

/// 分组自然键缺失等构建失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBuildError {
    pub field: String,
    pub message: String,
}

// ==========================================
// RowRecordBuilder - 单行记录构建器
// ==========================================
#[derive(Debug, Default)]
pub struct RowRecordBuilder {
    loan_number: Option<String>,
    asset: AssetRecord,
    loan: LoanRecord,
    property: PropertyRecord,
    foreclosure: ForeclosureRecord,
    valuation_source: Option<String>,
    valuation_date: Option<NaiveDate>,
    valuation_value: Option<BigDecimal>,
    bankruptcy: BankruptcyRecord,
    modification_date: Option<NaiveDate>,
    modification_type: Option<String>,
    modified_rate: Option<BigDecimal>,
    modified_balance: Option<BigDecimal>,
    modified_maturity_date: Option<NaiveDate>,
    special: SpecialRecord,
    rejected: Vec<FieldRejection>,
}

fn put<T>(slot: &mut Option<T>, value: T, overwrite: bool) -> bool {
    if overwrite || slot.is_none() {
        *slot = Some(value);
        true
    } else {
        false
    }
}

impl RowRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置字段（显式映射,覆盖已有值）
    pub fn set(&mut self, field: &str, value: FieldValue) -> Result<(), FieldRejection> {
        self.assign(field, value, true).map(|_| ())
    }

    /// 仅在字段为空时设置（派生值不覆盖显式映射值）
    ///
    /// 返回是否实际写入。
    pub fn set_if_absent(&mut self, field: &str, value: FieldValue) -> Result<bool, FieldRejection> {
        self.assign(field, value, false)
    }

    /// 被拒绝的字段（未知字段 / 类型不匹配）
    pub fn rejected(&self) -> &[FieldRejection] {
        &self.rejected
    }

    fn assign(&mut self, field: &str, value: FieldValue, overwrite: bool) -> Result<bool, FieldRejection> {
        let result = self.assign_inner(field, value, overwrite);
        if let Err(rejection) = &result {
            self.rejected.push(rejection.clone());
        }
        result
    }

    fn assign_inner(&mut self, field: &str, value: FieldValue, ow: bool) -> Result<bool, FieldRejection> {
        let written = match field {
            // ===== 资产 =====
            "loan_number" => put(&mut self.loan_number, value.into_text(field)?, ow),
            "asset_status" => put(&mut self.asset.asset_status, value.into_text(field)?, ow),
            "asset_type" => put(&mut self.asset.asset_type, value.into_text(field)?, ow),
            "acquisition_date" => put(&mut self.asset.acquisition_date, value.into_date(field)?, ow),
            "purchase_price" => put(&mut self.asset.purchase_price, value.into_decimal(field)?, ow),
            "servicer_name" => put(&mut self.asset.servicer_name, value.into_text(field)?, ow),
            "lien_position" => put(&mut self.asset.lien_position, value.into_integer(field)?, ow),

            // ===== 贷款 =====
            "original_balance" => put(&mut self.loan.original_balance, value.into_decimal(field)?, ow),
            "current_balance" => put(&mut self.loan.current_balance, value.into_decimal(field)?, ow),
            "interest_rate" => put(&mut self.loan.interest_rate, value.into_decimal(field)?, ow),
            "origination_date" => put(&mut self.loan.origination_date, value.into_date(field)?, ow),
            "maturity_date" => put(&mut self.loan.maturity_date, value.into_date(field)?, ow),
            "next_due_date" => put(&mut self.loan.next_due_date, value.into_date(field)?, ow),
            "paid_through_date" => put(&mut self.loan.paid_through_date, value.into_date(field)?, ow),
            "monthly_payment" => put(&mut self.loan.monthly_payment, value.into_decimal(field)?, ow),
            "escrow_balance" => put(&mut self.loan.escrow_balance, value.into_decimal(field)?, ow),
            "deferred_balance" => put(&mut self.loan.deferred_balance, value.into_decimal(field)?, ow),
            "loan_type" => put(&mut self.loan.loan_type, value.into_text(field)?, ow),
            "rate_type" => put(&mut self.loan.rate_type, value.into_text(field)?, ow),

            // ===== 抵押物 =====
            "property_address" => put(&mut self.property.property_address, value.into_text(field)?, ow),
            "property_city" => put(&mut self.property.property_city, value.into_text(field)?, ow),
            "property_state" => put(&mut self.property.property_state, value.into_text(field)?, ow),
            "property_zip" => put(&mut self.property.property_zip, value.into_text(field)?, ow),
            "property_county" => put(&mut self.property.property_county, value.into_text(field)?, ow),
            "property_type" => put(&mut self.property.property_type, value.into_text(field)?, ow),
            "year_built" => put(&mut self.property.year_built, value.into_integer(field)?, ow),
            "square_feet" => put(&mut self.property.square_feet, value.into_integer(field)?, ow),
            "occupancy" => put(&mut self.property.occupancy, value.into_text(field)?, ow),

            // ===== 止赎 =====
            "fc_status" => put(&mut self.foreclosure.fc_status, value.into_text(field)?, ow),
            "fc_referral_date" => put(&mut self.foreclosure.fc_referral_date, value.into_date(field)?, ow),
            "fc_first_legal_date" => put(&mut self.foreclosure.fc_first_legal_date, value.into_date(field)?, ow),
            "fc_sale_date" => put(&mut self.foreclosure.fc_sale_date, value.into_date(field)?, ow),
            "fc_attorney" => put(&mut self.foreclosure.fc_attorney, value.into_text(field)?, ow),

            // ===== 估值 =====
            "valuation_value" => put(&mut self.valuation_value, value.into_decimal(field)?, ow),
            "valuation_date" => put(&mut self.valuation_date, value.into_date(field)?, ow),
            "valuation_source" => put(&mut self.valuation_source, value.into_text(field)?, ow),

            // ===== 破产 =====
            "bk_chapter" => put(&mut self.bankruptcy.bk_chapter, value.into_integer(field)?, ow),
            "bk_filing_date" => put(&mut self.bankruptcy.bk_filing_date, value.into_date(field)?, ow),
            "bk_case_number" => put(&mut self.bankruptcy.bk_case_number, value.into_text(field)?, ow),
            "bk_discharge_date" => put(&mut self.bankruptcy.bk_discharge_date, value.into_date(field)?, ow),
            "bk_dismissal_date" => put(&mut self.bankruptcy.bk_dismissal_date, value.into_date(field)?, ow),

            // ===== 贷款修改 =====
            "modification_date" => put(&mut self.modification_date, value.into_date(field)?, ow),
            "modification_type" => put(&mut self.modification_type, value.into_text(field)?, ow),
            "modified_rate" => put(&mut self.modified_rate, value.into_decimal(field)?, ow),
            "modified_balance" => put(&mut self.modified_balance, value.into_decimal(field)?, ow),
            "modified_maturity_date" => put(&mut self.modified_maturity_date, value.into_date(field)?, ow),

            // ===== 特殊标志 =====
            "is_heloc" => put(&mut self.special.is_heloc, value.into_bool(field)?, ow),
            "in_litigation" => put(&mut self.special.in_litigation, value.into_bool(field)?, ow),
            "in_forbearance" => put(&mut self.special.in_forbearance, value.into_bool(field)?, ow),

            _ => return Err(FieldRejection::UnknownField(field.to_string())),
        };
        Ok(written)
    }

    /// 校验分组自然键并产出强类型记录
    pub fn build(self, row_number: usize) -> Result<RowRecords, RowBuildError> {
        let loan_number = self.loan_number.ok_or_else(|| RowBuildError {
            field: "loan_number".to_string(),
            message: "资产自然键 loan_number 缺失".to_string(),
        })?;

        let valuation = match self.valuation_value {
            None => None,
            Some(value) => {
                let valuation_date = self.valuation_date.ok_or_else(|| RowBuildError {
                    field: "valuation_date".to_string(),
                    message: "估值记录缺少生效日 valuation_date".to_string(),
                })?;
                Some(ValuationRecord {
                    valuation_source: self
                        .valuation_source
                        .unwrap_or_else(|| DEFAULT_VALUATION_SOURCE.to_string()),
                    valuation_date,
                    valuation_value: Some(value),
                })
            }
        };

        let has_modification = self.modification_type.is_some()
            || self.modified_rate.is_some()
            || self.modified_balance.is_some()
            || self.modified_maturity_date.is_some();
        let modification = if has_modification {
            let modification_date = self.modification_date.ok_or_else(|| RowBuildError {
                field: "modification_date".to_string(),
                message: "贷款修改记录缺少生效日 modification_date".to_string(),
            })?;
            Some(ModificationRecord {
                modification_date,
                modification_type: self.modification_type,
                modified_rate: self.modified_rate,
                modified_balance: self.modified_balance,
                modified_maturity_date: self.modified_maturity_date,
            })
        } else {
            None
        };

        Ok(RowRecords {
            row_number,
            loan_number,
            asset: self.asset,
            loan: (!self.loan.is_empty()).then_some(self.loan),
            property: (!self.property.is_empty()).then_some(self.property),
            foreclosure: (!self.foreclosure.is_empty()).then_some(self.foreclosure),
            valuation,
            bankruptcy: (!self.bankruptcy.is_empty()).then_some(self.bankruptcy),
            modification,
            special: (!self.special.is_empty()).then_some(self.special),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field_registry::FieldRegistry;
    use crate::domain::types::FieldValueType;
    use std::str::FromStr;

    fn sample_value(value_type: FieldValueType) -> Option<FieldValue> {
        match value_type {
            FieldValueType::Text => Some(FieldValue::Text("X".to_string())),
            FieldValueType::Integer => Some(FieldValue::Integer(1)),
            FieldValueType::Decimal | FieldValueType::Money | FieldValueType::Rate => {
                Some(FieldValue::Decimal(BigDecimal::from(1)))
            }
            FieldValueType::Date => Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
            FieldValueType::Boolean => Some(FieldValue::Boolean(true)),
            FieldValueType::LegacyType => None,
        }
    }

    #[test]
    fn test_builder_accepts_every_registry_field() {
        let registry = FieldRegistry::standard();
        let mut builder = RowRecordBuilder::new();
        for spec in registry.fields() {
            if let Some(value) = sample_value(spec.value_type) {
                assert!(builder.set(&spec.name, value).is_ok(), "字段 {} 未被接受", spec.name);
            }
        }
        assert!(builder.rejected().is_empty());

        let records = builder.build(2).unwrap();
        assert_eq!(records.groups().len(), TargetGroup::ALL.len());
    }

    #[test]
    fn test_builder_rejects_unknown_field() {
        let mut builder = RowRecordBuilder::new();
        let result = builder.set("favourite_colour", FieldValue::Text("blue".to_string()));
        assert_eq!(result, Err(FieldRejection::UnknownField("favourite_colour".to_string())));
        assert_eq!(builder.rejected().len(), 1);
    }

    #[test]
    fn test_builder_rejects_type_mismatch() {
        let mut builder = RowRecordBuilder::new();
        let result = builder.set("current_balance", FieldValue::Text("abc".to_string()));
        assert!(matches!(result, Err(FieldRejection::TypeMismatch { .. })));
    }

    #[test]
    fn test_build_requires_loan_number() {
        let mut builder = RowRecordBuilder::new();
        builder
            .set("current_balance", FieldValue::Decimal(BigDecimal::from_str("10.00").unwrap()))
            .unwrap();
        let err = builder.build(5).unwrap_err();
        assert_eq!(err.field, "loan_number");
    }

    #[test]
    fn test_groups_only_instantiated_when_populated() {
        let mut builder = RowRecordBuilder::new();
        builder.set("loan_number", FieldValue::Text("L1".to_string())).unwrap();
        builder
            .set("property_state", FieldValue::Text("CA".to_string()))
            .unwrap();
        // 只有生效日没有估值金额: 不实例化估值分组
        builder
            .set("valuation_date", FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
            .unwrap();

        let records = builder.build(2).unwrap();
        assert_eq!(records.groups(), vec![TargetGroup::Asset, TargetGroup::Property]);
    }

    #[test]
    fn test_valuation_source_defaults_to_tape() {
        let mut builder = RowRecordBuilder::new();
        builder.set("loan_number", FieldValue::Text("L1".to_string())).unwrap();
        builder
            .set("valuation_value", FieldValue::Decimal(BigDecimal::from(250000)))
            .unwrap();
        builder
            .set("valuation_date", FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
            .unwrap();

        let valuation = builder.build(2).unwrap().valuation.unwrap();
        assert_eq!(valuation.valuation_source, DEFAULT_VALUATION_SOURCE);
    }

    #[test]
    fn test_valuation_without_date_fails_row() {
        let mut builder = RowRecordBuilder::new();
        builder.set("loan_number", FieldValue::Text("L1".to_string())).unwrap();
        builder
            .set("valuation_value", FieldValue::Decimal(BigDecimal::from(250000)))
            .unwrap();
        let err = builder.build(4).unwrap_err();
        assert_eq!(err.field, "valuation_date");
    }

    #[test]
    fn test_set_if_absent_does_not_overwrite() {
        let mut builder = RowRecordBuilder::new();
        builder.set("property_type", FieldValue::Text("CONDO".to_string())).unwrap();
        let written = builder
            .set_if_absent("property_type", FieldValue::Text("SFR".to_string()))
            .unwrap();
        assert!(!written);

        builder.set("loan_number", FieldValue::Text("L1".to_string())).unwrap();
        let records = builder.build(2).unwrap();
        assert_eq!(records.property.unwrap().property_type.as_deref(), Some("CONDO"));
    }
}
