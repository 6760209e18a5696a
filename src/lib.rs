// ==========================================
// 磨粉厂筒仓台账系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 筒仓料位台账 (生产入库 / 包装出库 / 人工校正)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{LevelSource, PackageType, ProductionStatus, SiloType, UserRole};

// 领域实体
pub use domain::{
    LevelBand, Mill, PackagingEntry, Product, ProductionSession, Silo, SiloLevelLog,
};

// 引擎
pub use engine::{
    ChangeFeed, LedgerRecorder, PackagingProcessor, ProductionProcessor, ReportEngine,
    SiloStateProjector,
};

// API
pub use api::{FlowApi, MasterDataApi, PackagingApi, ProductionApi, ReportApi, SiloApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "磨粉厂筒仓台账系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
