// ==========================================
// 磨粉厂筒仓台账系统 - 包装 API
// ==========================================

use std::sync::Arc;

use crate::api::current_time;
use crate::api::error::{require_non_empty, ApiError, ApiResult};
use crate::domain::packaging::{
    CreatePackagingRequest, PackagingEntry, PackagingFilter, PackagingOutcome,
};
use crate::engine::outflow::PackagingProcessor;

/// 包装API
pub struct PackagingApi {
    processor: Arc<PackagingProcessor>,
}

impl PackagingApi {
    pub fn new(processor: Arc<PackagingProcessor>) -> Self {
        Self { processor }
    }

    /// 录入包装记录
    ///
    /// # 返回
    /// - Ok(PackagingOutcome): 包装记录 + 扣减后料位 + 台账条目
    /// - Err(ApiError::InsufficientStock): STRICT 模式下库存不足, 未写入任何数据
    pub fn create_entry(&self, req: CreatePackagingRequest) -> ApiResult<PackagingOutcome> {
        require_non_empty("筒仓ID", &req.silo_id)?;
        require_non_empty("工人ID", &req.worker_id)?;
        Ok(self.processor.create_entry(req, current_time())?)
    }

    pub fn list_entries(&self, filter: &PackagingFilter) -> ApiResult<Vec<PackagingEntry>> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(ApiError::InvalidInput(format!(
                    "开始时间晚于结束时间: {} > {}",
                    start, end
                )));
            }
        }
        Ok(self.processor.list_entries(filter)?)
    }

    pub fn list_today(&self) -> ApiResult<Vec<PackagingEntry>> {
        Ok(self.processor.list_today(current_time())?)
    }

    pub fn get_entry(&self, entry_id: &str) -> ApiResult<PackagingEntry> {
        require_non_empty("包装记录ID", entry_id)?;
        Ok(self.processor.get_entry(entry_id)?)
    }
}
