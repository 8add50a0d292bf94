// ==========================================
// 贷款数据带导入系统 - 值清洗与类型转换
// ==========================================
// 职责: 按标准字段值类型将原始文本转换为 FieldValue
// - 数值: 容忍千分位 / 货币符号 / 括号负数 / 尾随负号
// - 日期: 多格式依次尝试,兼容 Excel 序列号
// - 布尔: 常见真/假词表
// - 定点精度: Money 2 位、Rate 4 位（四舍五入）
// ==========================================

use crate::domain::records::FieldValue;
use crate::domain::types::FieldValueType;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::str::FromStr;

/// 视为空值的占位词（比较时忽略大小写）
const NULL_TOKENS: &[&str] = &["", "n/a", "na", "#n/a", "null", "none", "nil", "-", "--"];

const TRUE_TOKENS: &[&str] = &["y", "yes", "true", "t", "1", "x", "是"];
const FALSE_TOKENS: &[&str] = &["n", "no", "false", "f", "0", "否"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%Y%m%d",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// 单值转换失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionError {
    pub expected: FieldValueType,
    pub message: String,
}

impl std::fmt::Display for CoercionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "无法转换为 {}: {}", self.expected, self.message)
    }
}

/// Excel 日期序列号 → 日历日（1900 日期系统,基准 1899-12-30）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DataCleaner;

impl DataCleaner {
    /// 清洗文本（TRIM + 压缩内部空白）
    pub fn clean_text(&self, value: &str) -> String {
        value.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn is_null_token(&self, value: &str) -> bool {
        let trimmed = value.trim();
        NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
    }

    /// 按值类型转换
    ///
    /// # 返回
    /// - Ok(None): 空值 / 占位词
    /// - Ok(Some(v)): 转换结果
    /// - Err: 非空但无法转换
    pub fn coerce(&self, value_type: FieldValueType, raw: &str) -> Result<Option<FieldValue>, CoercionError> {
        if self.is_null_token(raw) {
            return Ok(None);
        }
        let fail = |message: String| CoercionError {
            expected: value_type,
            message,
        };

        let value = match value_type {
            FieldValueType::Text => FieldValue::Text(self.clean_text(raw)),
            FieldValueType::LegacyType => FieldValue::Text(self.clean_text(raw).to_uppercase()),
            FieldValueType::Integer => FieldValue::Integer(self.parse_integer(raw).map_err(fail)?),
            FieldValueType::Decimal => FieldValue::Decimal(self.parse_decimal(raw, false).map_err(fail)?),
            FieldValueType::Money | FieldValueType::Rate => {
                let allow_percent = value_type == FieldValueType::Rate;
                let parsed = self.parse_decimal(raw, allow_percent).map_err(fail)?;
                let scale = value_type.scale().unwrap_or(2);
                FieldValue::Decimal(parsed.with_scale_round(scale, RoundingMode::HalfUp))
            }
            FieldValueType::Date => FieldValue::Date(self.parse_date(raw).map_err(fail)?),
            FieldValueType::Boolean => FieldValue::Boolean(self.parse_bool(raw).map_err(fail)?),
        };
        Ok(Some(value))
    }

    /// 解析十进制数
    ///
    /// "$1,234.50" / "(500)" / "500-" / "USD 12" / "5.25%"（allow_percent）
    pub fn parse_decimal(&self, raw: &str, allow_percent: bool) -> Result<BigDecimal, String> {
        let mut s = raw.trim();
        let mut negative = false;

        if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
            negative = true;
            s = s[1..s.len() - 1].trim();
        }

        let mut cleaned: String = s
            .trim_start_matches("USD")
            .chars()
            .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '_' | ' ' | '\u{a0}'))
            .collect();

        if cleaned.ends_with('%') {
            if !allow_percent {
                return Err(format!("不接受百分号: {}", raw));
            }
            cleaned.pop();
        }

        if let Some(rest) = cleaned.strip_suffix('-') {
            negative = !negative;
            cleaned = rest.to_string();
        }
        if let Some(rest) = cleaned.strip_prefix('-') {
            negative = !negative;
            cleaned = rest.to_string();
        } else if let Some(rest) = cleaned.strip_prefix('+') {
            cleaned = rest.to_string();
        }

        if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
            return Err(format!("不是数值: {}", raw));
        }
        if !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '-' || c == '+')
        {
            return Err(format!("不是数值: {}", raw));
        }

        let value = BigDecimal::from_str(&cleaned).map_err(|e| format!("不是数值 {}: {}", raw, e))?;
        Ok(if negative { -value } else { value })
    }

    /// 解析整数（允许千分位与 ".0" 小数部分）
    pub fn parse_integer(&self, raw: &str) -> Result<i64, String> {
        let value = self.parse_decimal(raw, false)?;
        if value.with_scale(0) != value {
            return Err(format!("不是整数: {}", raw));
        }
        value.to_i64().ok_or_else(|| format!("整数越界: {}", raw))
    }

    /// 解析日期（多格式依次尝试,命中即返回）
    pub fn parse_date(&self, raw: &str) -> Result<NaiveDate, String> {
        let s = raw.trim();

        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Ok(date);
            }
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(dt.date());
            }
        }

        // 文本化的 Excel 序列号（如 "45292" 或 "45292.0"）
        if let Ok(serial) = s.parse::<f64>() {
            if (10_000.0..=100_000.0).contains(&serial) {
                if let Some(date) = excel_serial_to_date(serial) {
                    return Ok(date);
                }
            }
        }

        Err(format!("无法识别的日期格式: {}", raw))
    }

    pub fn parse_bool(&self, raw: &str) -> Result<bool, String> {
        let s = raw.trim().to_lowercase();
        if TRUE_TOKENS.contains(&s.as_str()) {
            Ok(true)
        } else if FALSE_TOKENS.contains(&s.as_str()) {
            Ok(false)
        } else {
            Err(format!("无法识别的布尔值: {}", raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimal(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_currency_and_separator_variants_are_equal() {
        let cleaner = DataCleaner;
        let a = cleaner.parse_decimal("$1,234.50", false).unwrap();
        let b = cleaner.parse_decimal("1234.50", false).unwrap();
        let c = cleaner.parse_decimal("1,234.5", false).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_parenthesis_and_trailing_minus_are_negative() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_decimal("(500)", false).unwrap(), decimal("-500"));
        assert_eq!(cleaner.parse_decimal("($1,000.25)", false).unwrap(), decimal("-1000.25"));
        assert_eq!(cleaner.parse_decimal("500-", false).unwrap(), decimal("-500"));
        assert!(cleaner.parse_decimal("twelve", false).is_err());
        assert!(cleaner.parse_decimal("1.2.3", false).is_err());
    }

    #[test]
    fn test_money_and_rate_quantization() {
        let cleaner = DataCleaner;
        let money = cleaner.coerce(FieldValueType::Money, "$1,234.505").unwrap();
        assert_eq!(money, Some(FieldValue::Decimal(decimal("1234.51"))));

        let rate = cleaner.coerce(FieldValueType::Rate, "5.125%").unwrap();
        assert_eq!(rate, Some(FieldValue::Decimal(decimal("5.1250"))));
        assert!(cleaner.coerce(FieldValueType::Decimal, "5%").is_err());
    }

    #[test]
    fn test_date_formats_yield_same_day() {
        let cleaner = DataCleaner;
        let iso = cleaner.parse_date("2024-03-05").unwrap();
        let us = cleaner.parse_date("03/05/2024").unwrap();
        assert_eq!(iso, us);
        assert_eq!(cleaner.parse_date("2024-03-05 00:00:00").unwrap(), iso);
        assert_eq!(cleaner.parse_date("45356").unwrap(), iso);
        assert!(cleaner.parse_date("sometime").is_err());
    }

    #[test]
    fn test_bool_and_null_tokens() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.coerce(FieldValueType::Boolean, "Yes").unwrap(), Some(FieldValue::Boolean(true)));
        assert_eq!(cleaner.coerce(FieldValueType::Boolean, "N").unwrap(), Some(FieldValue::Boolean(false)));
        assert!(cleaner.coerce(FieldValueType::Boolean, "maybe").is_err());
        assert_eq!(cleaner.coerce(FieldValueType::Money, "N/A").unwrap(), None);
        assert_eq!(cleaner.coerce(FieldValueType::Text, "  ").unwrap(), None);
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_integer("1,985").unwrap(), 1985);
        assert_eq!(cleaner.parse_integer("7.0").unwrap(), 7);
        assert!(cleaner.parse_integer("7.5").is_err());
    }
}
