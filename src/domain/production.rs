// ==========================================
// 磨粉厂筒仓台账系统 - 生产会话领域模型
// ==========================================
// 状态机: active ⇄ paused, {active, paused} -> {completed, cancelled}
// 产量口径: 报表时计算 = 小时产量 × 有效时长 (扣除暂停)
// ==========================================

use crate::domain::types::ProductionStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionSession - 生产会话
// ==========================================
// 对齐: production_sessions 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSession {
    pub id: String,
    pub mill_id: String,
    pub product_id: String,
    pub target_silo_id: String,
    pub hourly_rate_tons: f64,

    // ===== 时间线 =====
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub status: ProductionStatus,
    pub paused_at: Option<NaiveDateTime>, // 当前暂停区间起点
    pub paused_seconds: i64,              // 已结束的暂停区间累计

    pub notes: Option<String>,
    pub created_by: String,
    pub updated_at: NaiveDateTime,
}

impl ProductionSession {
    /// 会话是否已结束
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// 有效生产时长 (小时)
    ///
    /// 未结束的会话返回 None, 报表中不计入。
    pub fn effective_hours(&self) -> Option<f64> {
        let ended_at = self.ended_at?;
        let total = (ended_at - self.started_at).num_seconds();
        let effective = (total - self.paused_seconds).max(0);
        Some(effective as f64 / 3600.0)
    }

    /// 报表产量 (吨)
    pub fn produced_tons(&self) -> Option<f64> {
        self.effective_hours().map(|h| self.hourly_rate_tons * h)
    }
}

/// 开始生产请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub mill_id: String,
    pub product_id: String,
    pub target_silo_id: String,
    pub hourly_rate_tons: f64,
    pub notes: Option<String>,
    pub created_by: String,
}

// ==========================================
// Reconciliation - 生产入库对账
// ==========================================
// 对齐: production_reconciliations 表 (每个会话至多一条)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub session_id: String,
    pub level_log_id: String,
    pub quantity_tons: f64, // 报表口径产量
    pub applied_tons: f64,  // 实际计入筒仓
    pub overflow_tons: f64, // 超出容量部分
    pub reconciled_by: Option<String>,
    pub reconciled_at: NaiveDateTime,
}
