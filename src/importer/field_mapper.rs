// ==========================================
// 贷款数据带导入系统 - 字段映射器 (SchemaMapper)
// ==========================================
// 层级（按优先级）:
// 0. 人工映射 / 显式加载的映射配置（逐列原样应用）
// 1. 标准字段名 / 别名精确匹配（大小写、空白不敏感）
// 2. 复用卖方默认映射配置（已知源列须覆盖当前文件全部列）
// 3. AI 推断（建议目标必须存在于注册表且置信度达阈值）
// 4. 未映射（显式上报）
// 红线: 同一标准字段只归属第一个认领它的列
// 红线: 必填字段无任何层级可解析时映射失败
// ==========================================

use crate::ai::completion::CompletionBackend;
use crate::domain::field_registry::FieldRegistry;
use crate::domain::mapping::{ColumnResolution, FieldMapping, MappingArtifact};
use crate::domain::types::ResolutionTier;
use crate::importer::error::{ImportError, ImportResult};
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 映射输入
#[derive(Debug, Default, Clone, Copy)]
pub struct MappingRequest<'a> {
    pub columns: &'a [String],
    /// 人工映射或显式加载的映射配置
    pub manual: Option<&'a FieldMapping>,
    /// 卖方默认映射配置
    pub seller_default: Option<&'a MappingArtifact>,
    pub disable_ai: bool,
}

/// 映射输出
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    pub mapping: FieldMapping,
    /// 与输入列顺序一致
    pub resolutions: Vec<ColumnResolution>,
    pub warnings: Vec<String>,
    /// 层级 2 实际使用的映射配置
    pub used_artifact_id: Option<i64>,
    pub ai_invoked: bool,
}

impl MappingOutcome {
    pub fn unmapped_columns(&self) -> Vec<String> {
        self.mapping.unmapped_columns()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    target: Option<String>,
    tier: ResolutionTier,
    confidence: Option<f32>,
    /// 已定案（含显式未映射 / 目标冲突）
    settled: bool,
}

/// 单次映射的工作状态
struct Claims<'r> {
    registry: &'r FieldRegistry,
    slots: Vec<Slot>,
    owners: HashMap<String, usize>,
    warnings: Vec<String>,
}

impl<'r> Claims<'r> {
    fn new(registry: &'r FieldRegistry, width: usize) -> Self {
        Self {
            registry,
            slots: vec![
                Slot {
                    target: None,
                    tier: ResolutionTier::Unmapped,
                    confidence: None,
                    settled: false,
                };
                width
            ],
            owners: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn pending(&self, idx: usize) -> bool {
        !self.slots[idx].settled
    }

    /// 显式"未映射"
    fn settle_unmapped(&mut self, idx: usize) {
        self.slots[idx].settled = true;
    }

    /// 认领目标字段,返回是否成功
    fn claim(
        &mut self,
        idx: usize,
        column: &str,
        target: &str,
        tier: ResolutionTier,
        confidence: Option<f32>,
    ) -> bool {
        if !self.registry.contains(target) {
            self.warnings.push(format!(
                "列 '{}' 的 {} 映射目标 '{}' 不在标准字段注册表中,已拒绝",
                column, tier, target
            ));
            return false;
        }
        if let Some(&owner) = self.owners.get(target) {
            if owner != idx {
                self.warnings.push(format!(
                    "列 '{}' 与第 {} 列争用标准字段 '{}',保留先出现者",
                    column,
                    owner + 1,
                    target
                ));
                self.slots[idx].settled = true;
                return false;
            }
        }

        self.owners.insert(target.to_string(), idx);
        self.slots[idx] = Slot {
            target: Some(target.to_string()),
            tier,
            confidence,
            settled: true,
        };
        true
    }
}

// ==========================================
// SchemaMapper
// ==========================================
pub struct SchemaMapper {
    registry: Arc<FieldRegistry>,
    completion: Option<Arc<dyn CompletionBackend>>,
    confidence_threshold: f32,
    retry: RetryPolicy,
}

impl SchemaMapper {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self {
            registry,
            completion: None,
            confidence_threshold: 1.0,
            retry: RetryPolicy::none(),
        }
    }

    /// 挂载 AI 后端（启用层级 3）
    pub fn with_completion(
        mut self,
        backend: Arc<dyn CompletionBackend>,
        confidence_threshold: f32,
        retry: RetryPolicy,
    ) -> Self {
        self.completion = Some(backend);
        self.confidence_threshold = confidence_threshold;
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// 逐列解析映射
    #[instrument(skip_all, fields(columns = request.columns.len(), disable_ai = request.disable_ai))]
    pub async fn resolve(&self, request: MappingRequest<'_>) -> ImportResult<MappingOutcome> {
        let columns = request.columns;
        let mut claims = Claims::new(&self.registry, columns.len());

        // ===== 层级 0: 人工映射 =====
        if let Some(manual) = request.manual {
            for (idx, column) in columns.iter().enumerate() {
                let entry = manual
                    .entries()
                    .iter()
                    .find(|e| e.source_column == *column)
                    .or_else(|| manual.entry_for_normalized(column));
                match entry.map(|e| e.target_field.clone()) {
                    Some(Some(target)) => {
                        claims.claim(idx, column, &target, ResolutionTier::Manual, None);
                    }
                    Some(None) => claims.settle_unmapped(idx),
                    None => {}
                }
            }
        }

        // ===== 层级 1: 别名 =====
        for (idx, column) in columns.iter().enumerate() {
            if !claims.pending(idx) {
                continue;
            }
            if let Some(spec) = self.registry.resolve_alias(column) {
                let name = spec.name.clone();
                claims.claim(idx, column, &name, ResolutionTier::Alias, None);
            }
        }

        // ===== 层级 2: 卖方默认映射配置 =====
        let mut used_artifact_id = None;
        if let Some(artifact) = request.seller_default {
            if artifact.covers(columns) {
                for (idx, column) in columns.iter().enumerate() {
                    if !claims.pending(idx) {
                        continue;
                    }
                    let target = artifact
                        .mapping
                        .entry_for_normalized(column)
                        .and_then(|e| e.target_field.clone());
                    if let Some(target) = target {
                        if claims.claim(idx, column, &target, ResolutionTier::Artifact, None) {
                            used_artifact_id = artifact.artifact_id;
                        }
                    }
                }
            } else {
                debug!(artifact = %artifact.name, "卖方默认映射配置未覆盖当前文件列,跳过");
            }
        }

        // ===== 层级 3: AI 推断 =====
        let mut ai_invoked = false;
        let pending: Vec<(usize, String)> = columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| claims.pending(*idx))
            .map(|(idx, c)| (idx, c.clone()))
            .collect();

        if !pending.is_empty() && !request.disable_ai {
            if let Some(backend) = &self.completion {
                ai_invoked = true;
                self.apply_ai(backend.as_ref(), &pending, &mut claims).await;
            }
        }

        // ===== 层级 4: 未映射 =====
        let mut mapping = FieldMapping::new();
        let mut resolutions = Vec::with_capacity(columns.len());
        for (column, slot) in columns.iter().zip(claims.slots.iter()) {
            mapping.set(column, slot.target.clone());
            resolutions.push(ColumnResolution {
                source_column: column.clone(),
                target_field: slot.target.clone(),
                tier: if slot.target.is_some() {
                    slot.tier
                } else {
                    ResolutionTier::Unmapped
                },
                confidence: slot.confidence,
            });
        }

        let missing: Vec<String> = self
            .registry
            .required_fields()
            .filter(|f| !claims.owners.contains_key(&f.name))
            .map(|f| f.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::Mapping(format!(
                "必填字段无法映射: {}（源列: {:?}）",
                missing.join(", "),
                columns
            )));
        }

        let outcome = MappingOutcome {
            warnings: claims.warnings,
            mapping,
            resolutions,
            used_artifact_id,
            ai_invoked,
        };
        info!(
            mapped = outcome.mapping.mapped().count(),
            unmapped = outcome.unmapped_columns().len(),
            ai_invoked,
            used_artifact_id = ?used_artifact_id,
            "字段映射完成"
        );
        Ok(outcome)
    }

    /// 层级 3: 调用失败时告警并落入层级 4
    async fn apply_ai(&self, backend: &dyn CompletionBackend, pending: &[(usize, String)], claims: &mut Claims<'_>) {
        let names: Vec<String> = pending.iter().map(|(_, c)| c.clone()).collect();
        let fields = self.registry.fields();

        let suggestions = match self
            .retry
            .run("ai.suggest_mapping", || backend.suggest_mapping(&names, fields))
            .await
        {
            Ok(suggestions) => suggestions,
            Err(err) => {
                warn!(error = %err, "AI 映射不可用,剩余列保持未映射");
                claims.warnings.push(format!("AI 映射不可用: {}", err));
                return;
            }
        };

        for suggestion in suggestions {
            let Some(&(idx, ref column)) = pending.iter().find(|(_, c)| *c == suggestion.source_column) else {
                debug!(column = %suggestion.source_column, "AI 返回了未请求的列,忽略");
                continue;
            };
            if !claims.pending(idx) {
                continue;
            }
            let Some(target) = suggestion.target_field.as_deref() else {
                continue;
            };
            if suggestion.confidence < self.confidence_threshold {
                claims.warnings.push(format!(
                    "列 '{}' 的 AI 建议 '{}' 置信度 {:.2} 低于阈值 {:.2},未采纳",
                    column, target, suggestion.confidence, self.confidence_threshold
                ));
                continue;
            }
            claims.claim(idx, column, target, ResolutionTier::Ai, Some(suggestion.confidence));
        }
    }
}
