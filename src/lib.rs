// ==========================================
// 贷款数据带导入系统 - 核心库
// ==========================================
// 管道: 来源获取 → 卖方解析 → 表格读取 → 字段映射 → 转换与落库 → 运行汇总
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体、类型与标准字段注册表
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 读取 / 映射 / 转换 / 落库
pub mod importer;

// 来源获取层 - 上传与邮箱
pub mod acquisition;

// AI 推断后端
pub mod ai;

// 引擎层 - 卖方解析与运行编排
pub mod engine;

// 配置层 - 运行期参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 外部调用重试
pub mod retry;

// 日志系统
pub mod logging;

// API 层 - 入口操作
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    FieldMapping, FieldRegistry, ImportBatchResult, IngestOptions, MappingArtifact, RunState,
    SellerContext, SellerHint,
};
pub use engine::{IngestOrchestrator, SellerResolver};
pub use importer::{ImportError, ImportResult, SchemaMapper, TabularReader};
pub use api::{ApiError, IngestApi};
pub use app::{AppState, Collaborators};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "贷款数据带导入系统";
