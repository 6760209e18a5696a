// ==========================================
// 磨粉厂筒仓台账系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、纯计算规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod capacity;
pub mod flow;
pub mod level_log;
pub mod master;
pub mod packaging;
pub mod production;
pub mod report;
pub mod silo;
pub mod types;

// 重导出核心类型
pub use capacity::{LevelBand, LevelBandThresholds};
pub use flow::{FlowConnection, FlowEntity, FlowNode, NewFlowConnection};
pub use level_log::{NewLevelLog, SiloLevelLog};
pub use master::{
    Mill, MillDetail, MillUpdate, NewMill, Product, Separator, SiloProductRule, User, UserStats,
    UserUpdate,
};
pub use packaging::{CreatePackagingRequest, PackagingEntry, PackagingFilter, PackagingOutcome};
pub use production::{ProductionSession, Reconciliation, StartSessionRequest};
pub use report::{
    DateRange, PackagingReportRow, ProductionReportRow, ReportPeriod, SiloReportRow,
    WorkerPackagingStats, WorkerReportRow,
};
pub use silo::{
    InflowResult, NewSilo, Silo, SiloFleetSummary, SiloLevel, SiloLevelView, SiloUpdate,
};
pub use types::{FlowEntityType, LevelSource, PackageType, ProductionStatus, SiloType, UserRole};
