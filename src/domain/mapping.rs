// ==========================================
// 贷款数据带导入系统 - 字段映射模型
// ==========================================
// 职责: 源列 → 标准字段映射 / 映射层级审计 / 可持久化映射配置
// 红线: 映射目标必须存在于注册表;未映射列必须计数上报
// ==========================================

use crate::domain::field_registry::normalize_header;
use crate::domain::types::ResolutionTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ==========================================
// MappingEntry / FieldMapping
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_column: String,
    /// None 表示显式"未映射"
    pub target_field: Option<String>,
}

/// 有序的源列 → 标准字段映射
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    entries: Vec<MappingEntry>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置映射（同一源列重复设置时覆盖）
    pub fn set(&mut self, source_column: &str, target_field: Option<String>) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.source_column == source_column)
        {
            entry.target_field = target_field;
        } else {
            self.entries.push(MappingEntry {
                source_column: source_column.to_string(),
                target_field,
            });
        }
    }

    pub fn target_of(&self, source_column: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.source_column == source_column)
            .and_then(|e| e.target_field.as_deref())
    }

    /// 按标准化列名查找条目（用于复用映射配置）
    pub fn entry_for_normalized(&self, source_column: &str) -> Option<&MappingEntry> {
        let key = normalize_header(source_column);
        self.entries
            .iter()
            .find(|e| normalize_header(&e.source_column) == key)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn mapped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|e| {
            e.target_field
                .as_deref()
                .map(|t| (e.source_column.as_str(), t))
        })
    }

    pub fn unmapped_columns(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.target_field.is_none())
            .map(|e| e.source_column.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==========================================
// ColumnResolution - 单列映射审计
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnResolution {
    pub source_column: String,
    pub target_field: Option<String>,
    pub tier: ResolutionTier,
    /// AI 层给出的置信度（其他层为 None）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

// ==========================================
// MappingArtifact - 可持久化映射配置
// ==========================================
// 对齐: mapping_artifact 表
// 红线: 每个卖方至多一个默认配置（保存时原子清除旧默认）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingArtifact {
    pub artifact_id: Option<i64>,
    pub name: String,
    pub seller_id: Option<i64>,
    /// 生成该配置的层级组合,如 "alias+ai"
    pub resolution_method: String,
    pub source_columns: Vec<String>,
    pub mapping: FieldMapping,
    pub is_default: bool,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl MappingArtifact {
    /// 由映射结果构造新配置（尚未落库）
    pub fn from_resolutions(
        name: &str,
        seller_id: Option<i64>,
        resolutions: &[ColumnResolution],
        is_default: bool,
    ) -> Self {
        let mut mapping = FieldMapping::new();
        let mut tiers: Vec<&str> = Vec::new();
        for resolution in resolutions {
            mapping.set(&resolution.source_column, resolution.target_field.clone());
            let tier = resolution.tier.as_str();
            if resolution.tier != ResolutionTier::Unmapped && !tiers.contains(&tier) {
                tiers.push(tier);
            }
        }

        let now = Utc::now();
        Self {
            artifact_id: None,
            name: name.to_string(),
            seller_id,
            resolution_method: if tiers.is_empty() {
                ResolutionTier::Unmapped.as_str().to_string()
            } else {
                tiers.join("+")
            },
            source_columns: resolutions.iter().map(|r| r.source_column.clone()).collect(),
            mapping,
            is_default,
            usage_count: 0,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    /// 已知源列是否覆盖当前文件的全部列（标准化比较）
    pub fn covers(&self, columns: &[String]) -> bool {
        let known: HashSet<String> = self
            .source_columns
            .iter()
            .map(|c| normalize_header(c))
            .collect();
        columns
            .iter()
            .all(|c| known.contains(&normalize_header(c)))
    }
}
