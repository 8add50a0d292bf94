// ==========================================
// 贷款数据带导入系统 - 应用层
// ==========================================
// 职责: 组件装配,供命令行与集成测试使用
// ==========================================

pub mod state;

// 重导出
pub use state::{AppState, Collaborators};
