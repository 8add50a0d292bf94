// ==========================================
// 贷款数据带导入系统 - 运行编排器
// ==========================================
// 单次运行: Idle → Acquiring → Reading → Mapping → Importing → Summarizing → Complete
//           任一阶段失败 → Failed
// 红线: 每次运行都返回结构化 ImportBatchResult,失败不丢弃已提交进度
// 红线: 试运行经过全部阶段,但不写库 / 不写台账 / 不保存映射配置
// ==========================================

use crate::acquisition::mailbox::MailboxFilter;
use crate::acquisition::source_acquirer::{AcquiredSource, AcquisitionFailure, ScanOptions, SourceAcquirer};
use crate::ai::completion::CompletionBackend;
use crate::config::IngestConfigReader;
use crate::domain::field_registry::FieldRegistry;
use crate::domain::import_result::ImportBatchResult;
use crate::domain::mapping::{FieldMapping, MappingArtifact};
use crate::domain::options::IngestOptions;
use crate::domain::seller::{SellerContext, SellerHint};
use crate::domain::types::RunState;
use crate::engine::seller_resolver::{ResolvePolicy, SellerResolver};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{MappingRequest, SchemaMapper};
use crate::importer::file_parser::{ReadOptions, SheetSelector, TabularReader};
use crate::importer::tape_importer_trait::{ImportRequest, TapeImporter};
use crate::repository::import_run_repo::ImportRunRepository;
use crate::repository::mapping_artifact_repo::MappingArtifactRepository;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 状态推进（非法迁移视为内部错误）
fn advance(result: &mut ImportBatchResult, next: RunState) -> ImportResult<()> {
    if !result.state.can_transition_to(next) {
        return Err(ImportError::InternalError(format!(
            "非法状态迁移: {} -> {}",
            result.state, next
        )));
    }
    debug!(run_id = %result.run_id, from = %result.state, to = %next, "运行状态迁移");
    result.state = next;
    Ok(())
}

fn policy_of(options: &IngestOptions) -> ResolvePolicy {
    ResolvePolicy {
        auto_create: options.auto_create,
        dry_run: options.dry_run,
        disable_ai: options.disable_ai,
    }
}

/// 单次运行的计时与台账信息
struct RunClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RunClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

// ==========================================
// IngestOrchestrator
// ==========================================
pub struct IngestOrchestrator<C>
where
    C: IngestConfigReader,
{
    config: Arc<C>,
    registry: Arc<FieldRegistry>,
    reader: TabularReader,
    acquirer: SourceAcquirer,
    resolver: Arc<dyn SellerResolver>,
    importer: Arc<dyn TapeImporter>,
    artifacts: Arc<dyn MappingArtifactRepository>,
    runs: Arc<dyn ImportRunRepository>,
    completion: Option<Arc<dyn CompletionBackend>>,
}

impl<C> IngestOrchestrator<C>
where
    C: IngestConfigReader,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<C>,
        registry: Arc<FieldRegistry>,
        acquirer: SourceAcquirer,
        resolver: Arc<dyn SellerResolver>,
        importer: Arc<dyn TapeImporter>,
        artifacts: Arc<dyn MappingArtifactRepository>,
        runs: Arc<dyn ImportRunRepository>,
    ) -> Self {
        Self {
            config,
            registry,
            reader: TabularReader::new(),
            acquirer,
            resolver,
            importer,
            artifacts,
            runs,
            completion: None,
        }
    }

    pub fn with_reader(mut self, reader: TabularReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_completion(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.completion = Some(backend);
        self
    }

    async fn new_result(&self, file_name: &str, dry_run: bool) -> ImportBatchResult {
        let max_errors = match self.config.get_max_reported_errors().await {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "读取 max_reported_errors 失败,使用默认值");
                crate::domain::import_result::DEFAULT_MAX_REPORTED_ERRORS
            }
        };
        ImportBatchResult::new(&Uuid::new_v4().to_string(), file_name, dry_run, max_errors)
    }

    async fn schema_mapper(&self, disable_ai: bool) -> ImportResult<SchemaMapper> {
        let mapper = SchemaMapper::new(self.registry.clone());
        let Some(backend) = &self.completion else {
            return Ok(mapper);
        };
        if disable_ai || !self.config.get_ai_enabled().await? {
            return Ok(mapper);
        }
        let threshold = self.config.get_ai_confidence_threshold().await?;
        let retry = self.config.ai_retry_policy().await?;
        Ok(mapper.with_completion(backend.clone(), threshold, retry))
    }

    // ==========================================
    // 入口一: 单文件导入
    // ==========================================
    #[instrument(skip_all, fields(path = %path.display(), dry_run = options.dry_run))]
    pub async fn ingest_file(&self, path: &Path, hint: &SellerHint, options: &IngestOptions) -> ImportBatchResult {
        let clock = RunClock::start();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mut result = self.new_result(&file_name, options.dry_run).await;

        let outcome: ImportResult<()> = async {
            advance(&mut result, RunState::Acquiring)?;
            let source = self.acquirer.acquire_upload(path, options.password.clone()).await?;
            let context = self.resolver.resolve(hint, policy_of(options)).await?;
            self.process(source, context, options, &mut result).await
        }
        .await;

        self.finish(result, outcome, options, clock).await
    }

    // ==========================================
    // 入口二: 邮箱扫描
    // ==========================================
    /// 每个已获取的附件与每个被跳过的来源各对应一个结果
    ///
    /// 邮箱不可达（重试耗尽）返回 Acquisition 错误;匹配为空时返回空列表。
    #[instrument(skip_all, fields(dry_run = options.dry_run))]
    pub async fn scan_mailbox(
        &self,
        filter: &MailboxFilter,
        options: &IngestOptions,
    ) -> ImportResult<Vec<ImportBatchResult>> {
        let scan_options = ScanOptions {
            policy: policy_of(options),
            mark_read: options.mark_read,
            password: options.password.clone(),
        };
        let scan = self.acquirer.scan(filter, self.resolver.as_ref(), &scan_options).await?;

        let mut results = Vec::with_capacity(scan.sources.len() + scan.failures.len());
        for failure in scan.failures {
            results.push(self.skipped_source(failure, options).await);
        }
        for source in scan.sources {
            results.push(self.ingest_acquired(source, options).await);
        }

        info!(
            messages = scan.messages_matched,
            results = results.len(),
            failed = results.iter().filter(|r| r.is_failed()).count(),
            "邮箱扫描运行完成"
        );
        Ok(results)
    }

    async fn ingest_acquired(&self, source: AcquiredSource, options: &IngestOptions) -> ImportBatchResult {
        let clock = RunClock::start();
        let mut result = self.new_result(&source.file_name, options.dry_run).await;

        let outcome: ImportResult<()> = async {
            advance(&mut result, RunState::Acquiring)?;
            let context = match source.context.clone() {
                Some(context) => context,
                None => self.resolver.resolve(&SellerHint::default(), policy_of(options)).await?,
            };
            self.process(source, context, options, &mut result).await
        }
        .await;

        self.finish(result, outcome, options, clock).await
    }

    async fn skipped_source(&self, failure: AcquisitionFailure, options: &IngestOptions) -> ImportBatchResult {
        let clock = RunClock::start();
        let mut result = self.new_result(&failure.label(), options.dry_run).await;
        let outcome = advance(&mut result, RunState::Acquiring).and(Err(failure.error));
        self.finish(result, outcome, options, clock).await
    }

    /// 读取 → 映射 → 导入
    async fn process(
        &self,
        source: AcquiredSource,
        context: SellerContext,
        options: &IngestOptions,
        result: &mut ImportBatchResult,
    ) -> ImportResult<()> {
        result.seller_id = context.seller_id;
        result.seller_name = Some(context.seller_name.clone());
        result.trade_id = context.trade_id;
        info!(
            run_id = %result.run_id,
            file_name = %source.file_name,
            seller = %context.seller_name,
            resolution = ?context.resolution,
            "卖方上下文已确定"
        );

        // === Reading ===
        advance(result, RunState::Reading)?;
        let read_options = ReadOptions {
            sheet: match options.sheet_selector.as_deref() {
                Some(raw) => raw.parse().unwrap_or(SheetSelector::First),
                None => SheetSelector::First,
            },
            skip_rows: options.skip_rows,
            row_limit: options.row_limit,
            password: source.password.clone().or_else(|| context.tape_password.clone()),
        };
        let dataset = self.reader.read_bytes(&source.file_name, &source.bytes, &read_options)?;
        result.sheet = dataset.metadata.sheet.clone();
        result.detected_encoding = dataset.metadata.detected_encoding.clone();

        // === Mapping ===
        advance(result, RunState::Mapping)?;
        let explicit = self.explicit_mapping(options).await?;
        let seller_default = match context.seller_id {
            Some(seller_id) if explicit.is_none() => self.artifacts.get_default_for_seller(seller_id).await?,
            _ => None,
        };
        let mapper = self.schema_mapper(options.disable_ai).await?;
        let outcome = mapper
            .resolve(MappingRequest {
                columns: &dataset.columns,
                manual: explicit.as_ref().map(|(_, mapping)| mapping),
                seller_default: seller_default.as_ref(),
                disable_ai: options.disable_ai,
            })
            .await?;
        result.column_resolutions = outcome.resolutions.clone();
        result.unmapped_columns = outcome.unmapped_columns();
        result.warnings.extend(outcome.warnings.iter().cloned());

        let used_artifact = explicit
            .as_ref()
            .and_then(|(id, _)| *id)
            .or(outcome.used_artifact_id);
        result.mapping_artifact_id = used_artifact;

        if !options.dry_run {
            if let Some(artifact_id) = used_artifact {
                self.artifacts.increment_usage(artifact_id).await?;
            }
        }
        if let Some(name) = options.save_mapping_as.as_deref() {
            if options.dry_run {
                result
                    .warnings
                    .push(format!("试运行: 映射配置 '{}' 未保存", name));
            } else {
                let artifact = MappingArtifact::from_resolutions(
                    name,
                    context.seller_id,
                    &outcome.resolutions,
                    options.save_mapping_as_default,
                );
                let artifact_id = self.artifacts.save(&artifact).await?;
                info!(artifact_id, name, is_default = artifact.is_default, "映射配置已保存");
                result.mapping_artifact_id = Some(artifact_id);
            }
        }

        // === Importing ===
        advance(result, RunState::Importing)?;
        let batch_size = match options.batch_size {
            Some(n) => n,
            None => self.config.get_default_batch_size().await?,
        };
        self.importer
            .import(
                ImportRequest {
                    dataset: &dataset,
                    mapping: &outcome.mapping,
                    context: &context,
                    batch_size,
                    update_existing: options.update_existing,
                    dry_run: options.dry_run,
                },
                result,
            )
            .await?;

        advance(result, RunState::Summarizing)?;
        Ok(())
    }

    /// 显式映射: 人工映射优先,其次按 ID 加载的映射配置
    async fn explicit_mapping(&self, options: &IngestOptions) -> ImportResult<Option<(Option<i64>, FieldMapping)>> {
        if let Some(mapping) = &options.manual_mapping {
            return Ok(Some((None, mapping.clone())));
        }
        let Some(artifact_id) = options.mapping_artifact_id else {
            return Ok(None);
        };
        let artifact = self
            .artifacts
            .get(artifact_id)
            .await?
            .ok_or_else(|| ImportError::Mapping(format!("映射配置 {} 不存在", artifact_id)))?;
        Ok(Some((Some(artifact_id), artifact.mapping)))
    }

    /// 收尾: 终态 / 耗时 / 台账
    async fn finish(
        &self,
        mut result: ImportBatchResult,
        outcome: ImportResult<()>,
        options: &IngestOptions,
        clock: RunClock,
    ) -> ImportBatchResult {
        match outcome.and_then(|_| advance(&mut result, RunState::Complete)) {
            Ok(()) => info!(
                run_id = %result.run_id,
                file_name = %result.file_name,
                created = result.created,
                updated = result.updated,
                skipped = result.skipped,
                errors = result.error_count,
                "运行完成"
            ),
            Err(err) => {
                error!(run_id = %result.run_id, file_name = %result.file_name, error = %err, "运行失败");
                result.fail(err.to_string());
            }
        }
        result.elapsed_ms = clock.started.elapsed().as_millis() as u64;

        if !options.dry_run {
            if let Err(err) = self.runs.record_run(&result, clock.started_at).await {
                warn!(run_id = %result.run_id, error = %err, "运行台账写入失败");
            }
        }
        result
    }
}
