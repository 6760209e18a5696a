// ==========================================
// 磨粉厂筒仓台账系统 - 筒仓 API
// ==========================================
// 职责: 筒仓查询、人工校正料位、仪表读数、产品规则
// ==========================================

use std::sync::Arc;

use crate::api::error::{require_non_empty, ApiError, ApiResult};
use crate::api::current_time;
use crate::domain::level_log::{NewLevelLog, SiloLevelLog};
use crate::domain::master::SiloProductRule;
use crate::domain::silo::{Silo, SiloFleetSummary, SiloLevelView};
use crate::domain::types::LevelSource;
use crate::engine::ledger::LedgerRecorder;
use crate::engine::projector::{SetLevelRequest, SiloStateProjector};

// ==========================================
// SiloApi - 筒仓 API
// ==========================================

/// 筒仓API
///
/// 职责：
/// 1. 筒仓与当前料位查询
/// 2. 人工设置料位 (乐观锁可选)
/// 3. 仪表读数入账 (不修改当前料位)
pub struct SiloApi {
    projector: Arc<SiloStateProjector>,
    recorder: Arc<LedgerRecorder>,
}

impl SiloApi {
    pub fn new(projector: Arc<SiloStateProjector>, recorder: Arc<LedgerRecorder>) -> Self {
        Self {
            projector,
            recorder,
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn list_silos(&self, mill_id: Option<&str>) -> ApiResult<Vec<Silo>> {
        Ok(self.projector.list_silos(mill_id)?)
    }

    pub fn list_active_silos(&self, mill_id: Option<&str>) -> ApiResult<Vec<Silo>> {
        Ok(self.projector.list_active_silos(mill_id)?)
    }

    pub fn get_silo(&self, silo_id: &str) -> ApiResult<Silo> {
        require_non_empty("筒仓ID", silo_id)?;
        Ok(self.projector.get_silo(silo_id)?)
    }

    /// 查询当前料位视图
    ///
    /// # 返回
    /// - 百分比、吨位、容量、分档、偏差、revision
    pub fn get_silo_state(&self, silo_id: &str) -> ApiResult<SiloLevelView> {
        require_non_empty("筒仓ID", silo_id)?;
        Ok(self.projector.current_state(silo_id)?)
    }

    pub fn list_level_views(&self, mill_id: Option<&str>) -> ApiResult<Vec<SiloLevelView>> {
        Ok(self.projector.list_level_views(mill_id)?)
    }

    pub fn fleet_summary(&self) -> ApiResult<SiloFleetSummary> {
        Ok(self.projector.fleet_summary()?)
    }

    // ==========================================
    // 料位写入
    // ==========================================

    /// 人工设置料位
    ///
    /// # 参数
    /// - req.expected_revision: 前端读取时的 revision, 不匹配时返回 OptimisticLockFailure
    ///
    /// # 返回
    /// - Ok(SiloLevelLog): 新追加的 manual 台账
    pub fn set_level(&self, req: SetLevelRequest) -> ApiResult<SiloLevelLog> {
        require_non_empty("筒仓ID", &req.silo_id)?;
        require_non_empty("操作人", &req.recorded_by)?;
        Ok(self.projector.set_level(req, current_time())?)
    }

    /// 仪表读数入账
    pub fn record_sensor_reading(
        &self,
        silo_id: &str,
        level_percent: f64,
        level_tons: Option<f64>,
        notes: Option<String>,
    ) -> ApiResult<SiloLevelLog> {
        require_non_empty("筒仓ID", silo_id)?;
        let entry = NewLevelLog::new(silo_id, level_percent, level_tons, LevelSource::Sensor)
            .notes(notes);
        Ok(self.recorder.record(entry, current_time())?)
    }

    // ==========================================
    // 台账
    // ==========================================

    pub fn recent_logs(&self, silo_id: &str, limit: Option<usize>) -> ApiResult<Vec<SiloLevelLog>> {
        require_non_empty("筒仓ID", silo_id)?;
        if limit == Some(0) {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self.projector.recent_logs(silo_id, limit)?)
    }

    pub fn level_history(&self, silo_id: &str, days: Option<i64>) -> ApiResult<Vec<SiloLevelLog>> {
        require_non_empty("筒仓ID", silo_id)?;
        Ok(self.projector.level_history(silo_id, days, current_time())?)
    }

    // ==========================================
    // 产品规则
    // ==========================================

    pub fn list_product_rules(&self, silo_id: &str) -> ApiResult<Vec<SiloProductRule>> {
        require_non_empty("筒仓ID", silo_id)?;
        Ok(self.projector.list_product_rules(silo_id)?)
    }

    pub fn add_product_rule(&self, silo_id: &str, product_id: &str) -> ApiResult<SiloProductRule> {
        require_non_empty("筒仓ID", silo_id)?;
        require_non_empty("产品ID", product_id)?;
        Ok(self
            .projector
            .add_product_rule(silo_id, product_id, current_time())?)
    }

    pub fn remove_product_rule(&self, silo_id: &str, product_id: &str) -> ApiResult<bool> {
        require_non_empty("筒仓ID", silo_id)?;
        require_non_empty("产品ID", product_id)?;
        Ok(self
            .projector
            .remove_product_rule(silo_id, product_id, current_time())?)
    }
}
