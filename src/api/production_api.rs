// ==========================================
// 磨粉厂筒仓台账系统 - 生产 API
// ==========================================
// 职责: 生产会话的开始/暂停/恢复/结束, 入库对账, 查询
// ==========================================

use std::sync::Arc;

use crate::api::current_time;
use crate::api::error::{require_non_empty, ApiResult};
use crate::domain::production::{ProductionSession, Reconciliation, StartSessionRequest};
use crate::domain::types::ProductionStatus;
use crate::engine::inflow::ProductionProcessor;

/// 生产API
pub struct ProductionApi {
    processor: Arc<ProductionProcessor>,
}

impl ProductionApi {
    pub fn new(processor: Arc<ProductionProcessor>) -> Self {
        Self { processor }
    }

    /// 开始生产
    ///
    /// # 返回
    /// - Ok(ProductionSession): 新会话 (active)
    /// - Err(ApiError::NotFound): 磨机/产品/筒仓不存在
    /// - Err(ApiError::ValidationError): 小时产量非法或筒仓未启用
    pub fn start_session(&self, req: StartSessionRequest) -> ApiResult<ProductionSession> {
        require_non_empty("磨机ID", &req.mill_id)?;
        require_non_empty("产品ID", &req.product_id)?;
        require_non_empty("目标筒仓ID", &req.target_silo_id)?;
        Ok(self.processor.start_session(req, current_time())?)
    }

    pub fn pause_session(&self, session_id: &str) -> ApiResult<ProductionSession> {
        require_non_empty("会话ID", session_id)?;
        Ok(self.processor.pause_session(session_id, current_time())?)
    }

    pub fn resume_session(&self, session_id: &str) -> ApiResult<ProductionSession> {
        require_non_empty("会话ID", session_id)?;
        Ok(self.processor.resume_session(session_id, current_time())?)
    }

    /// 结束生产
    ///
    /// # 参数
    /// - status: completed / cancelled
    /// - actor: 操作人 (自动入库时记入台账)
    pub fn end_session(
        &self,
        session_id: &str,
        status: ProductionStatus,
        actor: Option<&str>,
    ) -> ApiResult<ProductionSession> {
        require_non_empty("会话ID", session_id)?;
        Ok(self
            .processor
            .end_session(session_id, status, actor, current_time())?)
    }

    /// 将已完成会话的产量计入目标筒仓 (每个会话一次)
    pub fn reconcile_session(&self, session_id: &str, actor: Option<&str>) -> ApiResult<Reconciliation> {
        require_non_empty("会话ID", session_id)?;
        Ok(self
            .processor
            .reconcile_session(session_id, actor, current_time())?)
    }

    pub fn get_session(&self, session_id: &str) -> ApiResult<ProductionSession> {
        require_non_empty("会话ID", session_id)?;
        Ok(self.processor.get_session(session_id)?)
    }

    pub fn get_reconciliation(&self, session_id: &str) -> ApiResult<Option<Reconciliation>> {
        require_non_empty("会话ID", session_id)?;
        Ok(self.processor.get_reconciliation(session_id)?)
    }

    pub fn list_sessions(&self, mill_id: Option<&str>, limit: Option<usize>) -> ApiResult<Vec<ProductionSession>> {
        Ok(self.processor.list_sessions(mill_id, limit)?)
    }

    pub fn list_active_sessions(&self, mill_id: Option<&str>) -> ApiResult<Vec<ProductionSession>> {
        Ok(self.processor.list_active_sessions(mill_id)?)
    }
}
