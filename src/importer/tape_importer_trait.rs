// ==========================================
// 贷款数据带导入系统 - 数据带导入 Trait
// ==========================================
// 职责: 定义"转换 + 落库"阶段接口（不包含实现）
// ==========================================

use crate::domain::dataset::RawTabularDataset;
use crate::domain::import_result::ImportBatchResult;
use crate::domain::mapping::FieldMapping;
use crate::domain::seller::SellerContext;
use crate::importer::error::ImportResult;
use async_trait::async_trait;

/// 导入阶段输入
#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    pub dataset: &'a RawTabularDataset,
    pub mapping: &'a FieldMapping,
    pub context: &'a SellerContext,
    /// 每个提交单元的行数
    pub batch_size: usize,
    /// false: 仅插入未出现过的身份
    pub update_existing: bool,
    pub dry_run: bool,
}

// ==========================================
// TapeImporter Trait
// ==========================================
// 实现者: TapeImporterImpl
#[async_trait]
pub trait TapeImporter: Send + Sync {
    /// 转换并落库,计数与错误累计进 result
    ///
    /// # 返回
    /// - Ok(()): 已处理全部行（个别批次失败记录在 result.failed_batches 中）
    /// - Err: 无法开始导入（映射目标非法 / 非试运行却只有占位卖方）
    ///
    /// # 失败隔离
    /// - 行级转换失败: 计入 result.errors,继续
    /// - 批次事务失败: 整批回滚,批内行计为错误,继续后续批次
    async fn import(&self, request: ImportRequest<'_>, result: &mut ImportBatchResult) -> ImportResult<()>;
}
