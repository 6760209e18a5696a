// ==========================================
// 磨粉厂筒仓台账系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 关联函数在调用方事务内执行, 不加锁
// ==========================================

pub mod error;
pub mod flow_repo;
pub mod level_log_repo;
pub mod master_repo;
pub mod packaging_repo;
pub mod production_repo;
pub mod report_repo;
pub mod silo_repo;
pub mod transaction;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use flow_repo::FlowRepository;
pub use level_log_repo::LevelLogRepository;
pub use master_repo::{MillRepository, ProductRepository, UserRepository};
pub use packaging_repo::PackagingEntryRepository;
pub use production_repo::ProductionSessionRepository;
pub use report_repo::{PackagingRecord, ProductionRecord, ReportRepository};
pub use silo_repo::SiloRepository;
pub use transaction::TransactionManager;
