// ==========================================
// 贷款数据带导入系统 - 导入层
// ==========================================
// 职责: 字节 → 原始数据集 → 字段映射 → 分组记录 → 落库
// 支持: 工作簿 (xlsx/xls/ods), 分隔文本 (csv/tsv/txt)
// ==========================================

// 模块声明
pub mod conflict_handler;
pub mod data_cleaner;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod legacy_type;
pub mod record_transformer;
pub mod tape_importer_impl;
pub mod tape_importer_trait;
pub mod text_decoder;

// 重导出核心类型
pub use conflict_handler::{ConflictHandler, DuplicateIdentity};
pub use data_cleaner::{CoercionError, DataCleaner};
pub use error::{ImportError, ImportResult};
pub use field_mapper::{MappingOutcome, MappingRequest, SchemaMapper};
pub use file_parser::{ContainerFormat, ReadOptions, SheetSelector, TabularReader, WorkbookDecryptor};
pub use legacy_type::LegacyTypeHandler;
pub use record_transformer::RecordTransformer;
pub use tape_importer_impl::TapeImporterImpl;
pub use text_decoder::{decode_text, DecodedText, TextDecoder};

// 重导出 Trait 接口
pub use tape_importer_trait::{ImportRequest, TapeImporter};
