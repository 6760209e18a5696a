// ==========================================
// 磨粉厂筒仓台账系统 - 应用层
// ==========================================
// 职责: 装配引擎与 API, 提供默认数据库路径
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
