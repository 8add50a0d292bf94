// ==========================================
// 贷款数据带导入系统 - 数据带导入器实现
// ==========================================
// 流程: 分批 → 行转换 → 重复检测 → 事务化 upsert（或试运行预估）
// 红线: 行级失败不中断批次;批次失败不影响已提交批次
// 红线: 试运行只读,不产生任何持久化副作用
// ==========================================

use crate::domain::field_registry::FieldRegistry;
use crate::domain::import_result::ImportBatchResult;
use crate::importer::conflict_handler::ConflictHandler;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::record_transformer::{to_row_error, RecordTransformer};
use crate::importer::tape_importer_trait::{ImportRequest, TapeImporter};
use crate::repository::portfolio_repo::{PendingIdentities, PortfolioRepository, PortfolioScope, RowOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// TapeImporterImpl
// ==========================================
pub struct TapeImporterImpl<R>
where
    R: PortfolioRepository,
{
    portfolio_repo: R,
    transformer: RecordTransformer,
}

impl<R> TapeImporterImpl<R>
where
    R: PortfolioRepository,
{
    pub fn new(portfolio_repo: R, registry: Arc<FieldRegistry>) -> Self {
        Self {
            portfolio_repo,
            transformer: RecordTransformer::new(registry),
        }
    }

    fn tally(outcomes: &[RowOutcome], result: &mut ImportBatchResult) {
        for outcome in outcomes {
            match outcome {
                RowOutcome::Created => result.created += 1,
                RowOutcome::Updated => result.updated += 1,
                RowOutcome::Skipped => result.skipped += 1,
            }
        }
    }
}

#[async_trait]
impl<R> TapeImporter for TapeImporterImpl<R>
where
    R: PortfolioRepository,
{
    #[instrument(skip_all, fields(run_id = %result.run_id, dry_run = request.dry_run))]
    async fn import(&self, request: ImportRequest<'_>, result: &mut ImportBatchResult) -> ImportResult<()> {
        let seller_id = request.context.seller_id;
        if seller_id.is_none() && !request.dry_run {
            return Err(ImportError::InternalError(
                "占位卖方只能用于试运行".to_string(),
            ));
        }

        let plan = self.transformer.plan(request.dataset, request.mapping)?;
        let batch_size = request.batch_size.max(1);
        let mut duplicates = ConflictHandler::new();
        let mut pending = PendingIdentities::new();

        result.total_rows = request.dataset.len();
        info!(
            total_rows = result.total_rows,
            mapped_columns = plan.len(),
            batch_size,
            update_existing = request.update_existing,
            "开始转换与落库"
        );

        for (batch_index, chunk) in request.dataset.rows.chunks(batch_size).enumerate() {
            // === 行转换（失败行隔离） ===
            let mut records = Vec::with_capacity(chunk.len());
            for row in chunk {
                match self.transformer.transform_row(&plan, row) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        debug!(row_number = row.row_number, error = %err, "行转换失败");
                        result.record_error(to_row_error(err, row.row_number));
                    }
                }
            }

            for duplicate in duplicates.detect_duplicates(&records) {
                warn!(
                    row_number = duplicate.row_number,
                    loan_number = %duplicate.loan_number,
                    first_row = duplicate.first_row,
                    "文件内资产标识重复"
                );
                result.warnings.push(duplicate.warning());
            }

            if records.is_empty() {
                continue;
            }

            // === 落库 / 预估 ===
            // 试运行: 只读判定,规则与实际落库相同
            if request.dry_run {
                let outcomes = self
                    .portfolio_repo
                    .classify_batch(seller_id, &records, request.update_existing, &mut pending)
                    .await?;
                Self::tally(&outcomes, result);
                continue;
            }

            let Some(seller_id) = seller_id else {
                continue;
            };
            let scope = PortfolioScope {
                seller_id,
                trade_id: request.context.trade_id,
            };
            match self
                .portfolio_repo
                .upsert_batch(scope, &records, request.update_existing)
                .await
            {
                Ok(outcomes) => {
                    Self::tally(&outcomes, result);
                    info!(batch_index, rows = records.len(), "批次已提交");
                }
                Err(err) => {
                    let first_row = records.first().map(|r| r.row_number).unwrap_or(0);
                    let last_row = records.last().map(|r| r.row_number).unwrap_or(0);
                    error!(batch_index, first_row, last_row, error = %err, "批次落库失败,已回滚");
                    result.record_batch_failure(first_row, last_row, records.len(), &err.to_string());
                }
            }
        }

        info!(
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            errors = result.error_count,
            failed_batches = result.failed_batches,
            "转换与落库完成"
        );
        Ok(())
    }
}
