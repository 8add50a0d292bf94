// ==========================================
// 贷款数据带导入系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、标准字段注册表
// 红线: 不含数据访问逻辑,不含管道逻辑
// ==========================================

pub mod dataset;
pub mod field_registry;
pub mod import_result;
pub mod mapping;
pub mod options;
pub mod records;
pub mod seller;
pub mod types;

// 重导出核心类型
pub use dataset::{RawTabularDataset, RawTabularRow, SourceMetadata};
pub use field_registry::{CanonicalFieldSpec, FieldRegistry, REGISTRY_VERSION};
pub use import_result::{ImportBatchResult, RowError};
pub use mapping::{ColumnResolution, FieldMapping, MappingArtifact};
pub use options::IngestOptions;
pub use records::{RowRecordBuilder, RowRecords};
pub use seller::{Seller, SellerContext, SellerHint, SellerResolution, SellerRule, Trade};
pub use types::{FieldValueType, ResolutionTier, RunState, SourceOrigin, TargetGroup};
