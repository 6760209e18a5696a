// ==========================================
// 磨粉厂筒仓台账系统 - 报表 API
// ==========================================

use std::sync::Arc;

use crate::api::current_time;
use crate::api::error::{require_non_empty, ApiError, ApiResult};
use crate::domain::report::{
    DateRange, PackagingReportRow, ProductionReportRow, ReportPeriod, SiloReportRow,
    WorkerPackagingStats, WorkerReportRow,
};
use crate::engine::report::ReportEngine;

/// 报表API
pub struct ReportApi {
    engine: Arc<ReportEngine>,
}

impl ReportApi {
    pub fn new(engine: Arc<ReportEngine>) -> Self {
        Self { engine }
    }

    fn range(period: ReportPeriod) -> ApiResult<DateRange> {
        let range = DateRange::for_period(period, current_time());
        if !range.is_valid() {
            return Err(ApiError::InvalidInput(format!(
                "日期区间无效: {} > {}",
                range.start, range.end
            )));
        }
        Ok(range)
    }

    pub fn production_report(&self, period: ReportPeriod) -> ApiResult<Vec<ProductionReportRow>> {
        Ok(self.engine.production_report(&Self::range(period)?)?)
    }

    pub fn packaging_report(&self, period: ReportPeriod) -> ApiResult<Vec<PackagingReportRow>> {
        Ok(self.engine.packaging_report(&Self::range(period)?)?)
    }

    pub fn silo_report(&self, period: ReportPeriod) -> ApiResult<Vec<SiloReportRow>> {
        Ok(self.engine.silo_report(&Self::range(period)?)?)
    }

    pub fn worker_report(&self, period: ReportPeriod) -> ApiResult<Vec<WorkerReportRow>> {
        Ok(self.engine.worker_report(&Self::range(period)?)?)
    }

    /// 某工人最近 days 天的包装统计
    pub fn worker_packaging_stats(&self, worker_id: &str, days: i64) -> ApiResult<WorkerPackagingStats> {
        require_non_empty("工人ID", worker_id)?;
        Ok(self
            .engine
            .worker_packaging_stats(worker_id, days, current_time())?)
    }
}
