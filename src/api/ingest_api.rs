// ==========================================
// 贷款数据带导入系统 - 导入 API
// ==========================================
// 入口: ingest_file / scan_mailbox（每次调用二选一）
// 职责: 入参校验 → 构造卖方提示 → 交给编排器
// ==========================================

use crate::acquisition::mailbox::MailboxFilter;
use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::import_result::ImportBatchResult;
use crate::domain::options::IngestOptions;
use crate::domain::seller::SellerHint;
use crate::engine::orchestrator::IngestOrchestrator;
use std::path::Path;
use tracing::info;

/// 卖方/交易提示: 纯数字视为 ID,其余视为名称
pub fn parse_hint(seller_hint: Option<&str>, trade_hint: Option<&str>) -> SellerHint {
    let mut hint = SellerHint::default();
    if let Some(raw) = seller_hint.map(str::trim).filter(|s| !s.is_empty()) {
        match raw.parse::<i64>() {
            Ok(id) => hint.seller_id = Some(id),
            Err(_) => hint.seller_name = Some(raw.to_string()),
        }
    }
    if let Some(raw) = trade_hint.map(str::trim).filter(|s| !s.is_empty()) {
        match raw.parse::<i64>() {
            Ok(id) => hint.trade_id = Some(id),
            Err(_) => hint.trade_name = Some(raw.to_string()),
        }
    }
    hint
}

fn validate_options(options: &IngestOptions) -> ApiResult<()> {
    if options.batch_size == Some(0) {
        return Err(ApiError::InvalidInput("batch_size 必须大于 0".to_string()));
    }
    if options.row_limit == Some(0) {
        return Err(ApiError::InvalidInput("row_limit 必须大于 0".to_string()));
    }
    if options.save_mapping_as_default && options.save_mapping_as.is_none() {
        return Err(ApiError::InvalidInput(
            "设为默认映射配置时必须提供 save_mapping_as".to_string(),
        ));
    }
    if options.manual_mapping.is_some() && options.mapping_artifact_id.is_some() {
        return Err(ApiError::InvalidInput(
            "人工映射与映射配置 ID 不能同时指定".to_string(),
        ));
    }
    Ok(())
}

/// 导入 API
pub struct IngestApi {
    orchestrator: IngestOrchestrator<ConfigManager>,
}

impl IngestApi {
    pub fn new(orchestrator: IngestOrchestrator<ConfigManager>) -> Self {
        Self { orchestrator }
    }

    /// 导入单个文件
    ///
    /// 文件级失败（卖方、读取、映射）体现在返回结果的 state / failure 中;
    /// 只有入参不合法时返回 Err。
    pub async fn ingest_file(
        &self,
        path: &str,
        seller_hint: Option<&str>,
        trade_hint: Option<&str>,
        auto_create: bool,
        mut options: IngestOptions,
    ) -> ApiResult<ImportBatchResult> {
        if path.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
        }
        validate_options(&options)?;
        options.auto_create = auto_create;

        let hint = parse_hint(seller_hint, trade_hint);
        info!(path, seller_id = ?hint.seller_id, seller_name = ?hint.seller_name, dry_run = options.dry_run, "ingest_file");
        Ok(self.orchestrator.ingest_file(Path::new(path), &hint, &options).await)
    }

    /// 扫描邮箱并逐个导入附件
    pub async fn scan_mailbox(
        &self,
        filter: &MailboxFilter,
        options: IngestOptions,
    ) -> ApiResult<Vec<ImportBatchResult>> {
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since >= until {
                return Err(ApiError::InvalidInput(format!(
                    "时间窗口无效: {} >= {}",
                    since, until
                )));
            }
        }
        validate_options(&options)?;
        if options.mapping_artifact_id.is_some() || options.manual_mapping.is_some() {
            return Err(ApiError::InvalidInput(
                "邮箱扫描不支持指定映射配置".to_string(),
            ));
        }

        info!(dry_run = options.dry_run, unread_only = filter.unread_only, "scan_mailbox");
        Ok(self.orchestrator.scan_mailbox(filter, &options).await?)
    }
}
