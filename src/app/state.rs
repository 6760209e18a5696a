// ==========================================
// 磨粉厂筒仓台账系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 所有仓储、配置、引擎共享同一个连接; 写事务由 TransactionManager 串行化
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{
    ConfigApi, FlowApi, MasterDataApi, PackagingApi, ProductionApi, ReportApi, SiloApi,
};
use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::events::{ChangeFeed, OptionalEventPublisher, DEFAULT_FEED_CAPACITY};
use crate::engine::{
    LedgerRecorder, LedgerRepositories, MasterDataManager, PackagingProcessor, ProductionProcessor,
    ReportEngine, SiloStateProjector,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "PLANT_SILO_LEDGER_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 变更通知 (订阅后按表过滤)
    pub change_feed: ChangeFeed,

    pub silo_api: Arc<SiloApi>,
    pub production_api: Arc<ProductionApi>,
    pub packaging_api: Arc<PackagingApi>,
    pub report_api: Arc<ReportApi>,
    pub flow_api: Arc<FlowApi>,
    pub master_data_api: Arc<MasterDataApi>,
    pub config_api: Arc<ConfigApi>,

    /// 共享仓储 (CLI/工具使用)
    pub repos: LedgerRepositories,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径 (不存在时自动创建并建表)
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库连接: {}", e))?;
        Self::from_connection(db_path, conn)
    }

    /// 基于已打开的连接创建 (测试使用内存库)
    pub fn from_connection(db_path: String, conn: Connection) -> Result<Self, String> {
        init_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法初始化ConfigManager: {}", e))?,
        );

        let change_feed = ChangeFeed::new(DEFAULT_FEED_CAPACITY);
        let events = OptionalEventPublisher::with_publisher(Arc::new(change_feed.clone()));
        let repos = LedgerRepositories::from_connection(conn);

        // ==========================================
        // 引擎
        // ==========================================
        let recorder = Arc::new(LedgerRecorder::new(repos.clone(), events.clone()));
        let projector = Arc::new(SiloStateProjector::new(
            repos.clone(),
            config.clone(),
            events.clone(),
        ));
        let production = Arc::new(ProductionProcessor::new(
            repos.clone(),
            config.clone(),
            events.clone(),
        ));
        let packaging = Arc::new(PackagingProcessor::new(
            repos.clone(),
            config.clone(),
            events.clone(),
        ));
        let reports = Arc::new(ReportEngine::new(repos.clone()));
        let master_data = Arc::new(MasterDataManager::new(repos.clone(), events.clone()));

        // ==========================================
        // API
        // ==========================================
        let state = Self {
            db_path,
            silo_api: Arc::new(SiloApi::new(projector, recorder)),
            production_api: Arc::new(ProductionApi::new(production)),
            packaging_api: Arc::new(PackagingApi::new(packaging)),
            report_api: Arc::new(ReportApi::new(reports)),
            flow_api: Arc::new(FlowApi::new(repos.flow_repo.clone(), events.clone())),
            master_data_api: Arc::new(MasterDataApi::new(repos.clone(), master_data, events)),
            config_api: Arc::new(ConfigApi::new(config)),
            change_feed,
            repos,
        };

        tracing::info!("AppState初始化完成");
        Ok(state)
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 `PLANT_SILO_LEDGER_DB_PATH` > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./plant_silo_ledger.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("plant-silo-ledger");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("plant_silo_ledger.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_in_memory() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        let state = AppState::from_connection(":memory:".to_string(), conn).unwrap();

        assert_eq!(state.get_db_path(), ":memory:");
        assert!(state.silo_api.list_silos(None).unwrap().is_empty());
        assert_eq!(state.change_feed.subscriber_count(), 0);
    }
}
