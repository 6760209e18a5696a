// ==========================================
// 磨粉厂筒仓台账系统 - 引擎层
// ==========================================
// 职责: 台账业务规则 (记录 / 入库 / 出库 / 投影 / 报表) 与主数据维护
// 红线: Engine 不拼 SQL; 多步写入必须在同一事务内
// ==========================================

pub mod error;
pub mod events;
pub mod inflow;
pub mod ledger;
pub mod master_data;
pub mod outflow;
pub mod projector;
pub mod report;
pub mod repositories;

// 重导出核心引擎
pub use error::{LedgerError, LedgerResult};
pub use events::{
    ChangeEvent, ChangeEventPublisher, ChangeFeed, ChangeFeedError, ChangeKind,
    ChangeSubscription, ChangeTable, NoOpEventPublisher, OptionalEventPublisher,
};
pub use inflow::ProductionProcessor;
pub use ledger::LedgerRecorder;
pub use master_data::MasterDataManager;
pub use outflow::PackagingProcessor;
pub use projector::{SetLevelRequest, SiloStateProjector};
pub use report::ReportEngine;
pub use repositories::LedgerRepositories;
