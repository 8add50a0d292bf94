// ==========================================
// 贷款数据带导入系统 - 领域类型定义
// ==========================================
// 职责: 字段分组 / 值类型 / 映射层级 / 运行状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 目标记录分组 (Target Record Group)
// ==========================================
// 一行数据按分组拆分,每个分组独立按自然键落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetGroup {
    Asset,        // 资产（锚点）
    Loan,         // 贷款
    Property,     // 抵押物
    Foreclosure,  // 止赎
    Valuation,    // 估值
    Bankruptcy,   // 破产
    Modification, // 贷款修改
    Special,      // 特殊标志
}

impl TargetGroup {
    pub const ALL: [TargetGroup; 8] = [
        TargetGroup::Asset,
        TargetGroup::Loan,
        TargetGroup::Property,
        TargetGroup::Foreclosure,
        TargetGroup::Valuation,
        TargetGroup::Bankruptcy,
        TargetGroup::Modification,
        TargetGroup::Special,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetGroup::Asset => "asset",
            TargetGroup::Loan => "loan",
            TargetGroup::Property => "property",
            TargetGroup::Foreclosure => "foreclosure",
            TargetGroup::Valuation => "valuation",
            TargetGroup::Bankruptcy => "bankruptcy",
            TargetGroup::Modification => "modification",
            TargetGroup::Special => "special",
        }
    }
}

impl fmt::Display for TargetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 字段值类型 (Field Value Type)
// ==========================================
// 决定强制类型转换规则与定点精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValueType {
    Text,
    Integer,
    Decimal,
    Money,      // 金额,2 位小数
    Rate,       // 利率,4 位小数,容忍百分号
    Date,
    Boolean,
    LegacyType, // 历史通用"类型"列,一对多拆分
}

impl FieldValueType {
    /// 定点精度（None 表示保持原精度）
    pub fn scale(&self) -> Option<i64> {
        match self {
            FieldValueType::Money => Some(2),
            FieldValueType::Rate => Some(4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldValueType::Text => "text",
            FieldValueType::Integer => "integer",
            FieldValueType::Decimal => "decimal",
            FieldValueType::Money => "money",
            FieldValueType::Rate => "rate",
            FieldValueType::Date => "date",
            FieldValueType::Boolean => "boolean",
            FieldValueType::LegacyType => "legacy_type",
        }
    }
}

impl fmt::Display for FieldValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 映射层级 (Resolution Tier)
// ==========================================
// 优先级: Manual > Alias > Artifact > Ai > Unmapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Manual,   // 人工指定 / 显式加载的映射配置
    Alias,    // 标准字段名/别名精确匹配
    Artifact, // 复用卖方默认映射配置
    Ai,       // AI 推断
    Unmapped, // 未映射（显式上报）
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::Manual => "manual",
            ResolutionTier::Alias => "alias",
            ResolutionTier::Artifact => "artifact",
            ResolutionTier::Ai => "ai",
            ResolutionTier::Unmapped => "unmapped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(ResolutionTier::Manual),
            "alias" => Some(ResolutionTier::Alias),
            "artifact" => Some(ResolutionTier::Artifact),
            "ai" => Some(ResolutionTier::Ai),
            "unmapped" => Some(ResolutionTier::Unmapped),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 运行状态机 (Run State)
// ==========================================
// Idle → Acquiring → Reading → Mapping → Importing → Summarizing → {Complete | Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Acquiring,
    Reading,
    Mapping,
    Importing,
    Summarizing,
    Complete,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed)
    }

    /// 状态转换是否合法（任意非终态均可进入 Failed）
    pub fn can_transition_to(&self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RunState::Failed {
            return true;
        }
        matches!(
            (self, next),
            (RunState::Idle, RunState::Acquiring)
                | (RunState::Acquiring, RunState::Reading)
                | (RunState::Reading, RunState::Mapping)
                | (RunState::Mapping, RunState::Importing)
                | (RunState::Importing, RunState::Summarizing)
                | (RunState::Summarizing, RunState::Complete)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Acquiring => write!(f, "ACQUIRING"),
            RunState::Reading => write!(f, "READING"),
            RunState::Mapping => write!(f, "MAPPING"),
            RunState::Importing => write!(f, "IMPORTING"),
            RunState::Summarizing => write!(f, "SUMMARIZING"),
            RunState::Complete => write!(f, "COMPLETE"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 数据来源 (Source Origin)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    Upload,
    Mailbox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_happy_path() {
        let path = [
            RunState::Idle,
            RunState::Acquiring,
            RunState::Reading,
            RunState::Mapping,
            RunState::Importing,
            RunState::Summarizing,
            RunState::Complete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_run_state_terminal_is_final() {
        assert!(!RunState::Complete.can_transition_to(RunState::Failed));
        assert!(!RunState::Failed.can_transition_to(RunState::Idle));
        assert!(RunState::Mapping.can_transition_to(RunState::Failed));
        assert!(!RunState::Reading.can_transition_to(RunState::Importing));
    }

    #[test]
    fn test_money_and_rate_scale() {
        assert_eq!(FieldValueType::Money.scale(), Some(2));
        assert_eq!(FieldValueType::Rate.scale(), Some(4));
        assert_eq!(FieldValueType::Decimal.scale(), None);
    }
}
