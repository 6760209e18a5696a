// ==========================================
// 磨粉厂筒仓台账系统 - API 层
// ==========================================
// 职责: 参数校验、错误转换, 供上层 (CLI / 前端桥接) 调用
// 约定: 业务时间由 API 层取本地时间, 引擎只接收显式时间
// ==========================================

pub mod config_api;
pub mod error;
pub mod flow_api;
pub mod master_data_api;
pub mod packaging_api;
pub mod production_api;
pub mod report_api;
pub mod silo_api;

// 重导出核心类型
pub use config_api::{ConfigApi, ConfigItem};
pub use error::{ApiError, ApiResult};
pub use flow_api::FlowApi;
pub use master_data_api::MasterDataApi;
pub use packaging_api::PackagingApi;
pub use production_api::ProductionApi;
pub use report_api::ReportApi;
pub use silo_api::SiloApi;

use chrono::{NaiveDateTime, Timelike};

/// 当前本地时间 (秒精度, 与库中存储格式一致)
pub fn current_time() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
