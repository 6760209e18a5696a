// ==========================================
// 磨粉厂筒仓台账系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合台账引擎所需的 Repository 与事务管理器
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    FlowRepository, LevelLogRepository, MillRepository, PackagingEntryRepository,
    ProductRepository, ProductionSessionRepository, ReportRepository, SiloRepository,
    TransactionManager, UserRepository,
};

/// 台账引擎仓储集合
///
/// 所有仓储共享同一个连接; 写事务统一走 `tx_manager`。
#[derive(Clone)]
pub struct LedgerRepositories {
    pub tx_manager: Arc<TransactionManager>,
    pub silo_repo: Arc<SiloRepository>,
    pub level_log_repo: Arc<LevelLogRepository>,
    pub session_repo: Arc<ProductionSessionRepository>,
    pub packaging_repo: Arc<PackagingEntryRepository>,
    pub mill_repo: Arc<MillRepository>,
    pub product_repo: Arc<ProductRepository>,
    pub user_repo: Arc<UserRepository>,
    pub flow_repo: Arc<FlowRepository>,
    pub report_repo: Arc<ReportRepository>,
}

impl LedgerRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            tx_manager: Arc::new(TransactionManager::new(conn.clone())),
            silo_repo: Arc::new(SiloRepository::new(conn.clone())),
            level_log_repo: Arc::new(LevelLogRepository::new(conn.clone())),
            session_repo: Arc::new(ProductionSessionRepository::new(conn.clone())),
            packaging_repo: Arc::new(PackagingEntryRepository::new(conn.clone())),
            mill_repo: Arc::new(MillRepository::new(conn.clone())),
            product_repo: Arc::new(ProductRepository::new(conn.clone())),
            user_repo: Arc::new(UserRepository::new(conn.clone())),
            flow_repo: Arc::new(FlowRepository::new(conn.clone())),
            report_repo: Arc::new(ReportRepository::new(conn)),
        }
    }
}
