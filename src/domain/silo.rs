// ==========================================
// 磨粉厂筒仓台账系统 - 筒仓领域模型
// ==========================================
// 红线: 筒仓行上的 (百分比, 吨位) 是唯一的“当前值”
// 说明: 百分比与吨位分别可写, 一致性不强制 (偏差仅告警)
// ==========================================

use crate::domain::capacity::{percent_from_tons, LevelBand, LevelBandThresholds};
use crate::domain::types::SiloType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Silo - 筒仓
// ==========================================
// 对齐: silos 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silo {
    // ===== 标识 =====
    pub id: String,
    pub code: String,
    pub name: String,
    pub silo_type: SiloType,

    // ===== 容量 =====
    pub capacity_meters: Option<f64>, // 名义高度 (米)
    pub capacity_tons: Option<f64>,   // 名义吨位

    // ===== 当前料位 =====
    pub current_level_percent: f64,
    pub current_level_tons: f64,

    // ===== 归属/状态 =====
    pub mill_id: Option<String>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub revision: i64, // 每次料位写入 +1

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub created_by: Option<String>,
}

/// 新建筒仓请求 (料位从 0 开始)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSilo {
    pub code: String,
    pub name: String,
    pub silo_type: SiloType,
    pub capacity_meters: Option<f64>,
    pub capacity_tons: Option<f64>,
    pub mill_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// 筒仓基础信息更新 (不含料位)
///
/// 外层 None 表示不修改; 可空字段用 Some(None) 清空
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiloUpdate {
    pub name: Option<String>,
    pub silo_type: Option<SiloType>,
    pub capacity_meters: Option<Option<f64>>,
    pub capacity_tons: Option<Option<f64>>,
    pub mill_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub notes: Option<Option<String>>,
}

impl SiloUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.silo_type.is_none()
            && self.capacity_meters.is_none()
            && self.capacity_tons.is_none()
            && self.mill_id.is_none()
            && self.is_active.is_none()
            && self.notes.is_none()
    }
}

/// 一次料位变更后的目标值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiloLevel {
    pub percent: f64,
    pub tons: f64,
}

/// 入库计算结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InflowResult {
    pub level: SiloLevel,
    pub applied_tons: f64,  // 实际计入的吨位
    pub overflow_tons: f64, // 超出容量部分
}

impl Silo {
    /// 由吨位推算的百分比 (容量未知时为 None)
    pub fn derived_percent(&self) -> Option<f64> {
        percent_from_tons(self.current_level_tons, self.capacity_tons)
    }

    /// 存储百分比与推算百分比之间的偏差 (百分点)
    pub fn level_drift(&self) -> Option<f64> {
        self.derived_percent()
            .map(|p| (self.current_level_percent - p).abs())
    }

    /// 包装出库后的料位
    ///
    /// new_tons = max(0, current - quantity)
    /// new_percent = 容量已知 ? new_tons / capacity * 100 : 0
    pub fn level_after_outflow(&self, quantity_tons: f64) -> SiloLevel {
        let tons = (self.current_level_tons - quantity_tons).max(0.0);
        let percent = percent_from_tons(tons, self.capacity_tons).unwrap_or(0.0);
        SiloLevel { percent, tons }
    }

    /// 生产入库后的料位
    ///
    /// 容量已知时封顶于容量, 超出部分记为 overflow。
    /// 当前值已超过容量时保持不变, 入库量全部计为 overflow。
    pub fn level_after_inflow(&self, quantity_tons: f64) -> InflowResult {
        let raw = self.current_level_tons + quantity_tons.max(0.0);
        let (tons, overflow) = match self.capacity_tons.filter(|c| c.is_finite() && *c > 0.0) {
            Some(cap) if raw > cap => {
                let kept = cap.max(self.current_level_tons);
                (kept, raw - kept)
            }
            _ => (raw, 0.0),
        };
        let percent = percent_from_tons(tons, self.capacity_tons).unwrap_or(0.0);
        InflowResult {
            level: SiloLevel { percent, tons },
            applied_tons: tons - self.current_level_tons,
            overflow_tons: overflow,
        }
    }

    /// 应用基础信息更新
    ///
    /// # 返回
    /// - Err: 新容量已知且小于当前库存
    pub fn apply_update(&mut self, update: &SiloUpdate, now: NaiveDateTime) -> Result<(), String> {
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
        }
        if let Some(silo_type) = update.silo_type {
            self.silo_type = silo_type;
        }
        if let Some(meters) = update.capacity_meters {
            self.capacity_meters = meters;
        }
        if let Some(tons) = update.capacity_tons {
            self.capacity_tons = tons;
        }
        if let Some(mill_id) = &update.mill_id {
            self.mill_id = mill_id.clone();
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        if let Some(notes) = &update.notes {
            self.notes = notes.clone();
        }
        self.updated_at = now;

        match self.capacity_tons.filter(|c| c.is_finite() && *c > 0.0) {
            Some(cap) if self.current_level_tons > cap => Err(format!(
                "当前库存 {} 吨超过新容量 {} 吨",
                self.current_level_tons, cap
            )),
            _ => Ok(()),
        }
    }

    /// 当前视图
    pub fn level_view(&self, thresholds: &LevelBandThresholds) -> SiloLevelView {
        SiloLevelView {
            silo_id: self.id.clone(),
            silo_code: self.code.clone(),
            level_percent: self.current_level_percent,
            level_tons: self.current_level_tons,
            capacity_tons: self.capacity_tons,
            band: thresholds.classify(self.current_level_percent),
            drift_percent: self.level_drift(),
            revision: self.revision,
        }
    }
}

// ==========================================
// SiloLevelView - 当前料位视图
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiloLevelView {
    pub silo_id: String,
    pub silo_code: String,
    pub level_percent: f64,
    pub level_tons: f64,
    pub capacity_tons: Option<f64>,
    pub band: LevelBand,
    pub drift_percent: Option<f64>,
    pub revision: i64,
}

// ==========================================
// SiloFleetSummary - 筒仓总览
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiloFleetSummary {
    pub silo_count: usize,
    pub active_count: usize,
    pub average_level_percent: f64,
    pub total_level_tons: f64,
}

impl SiloFleetSummary {
    /// 汇总筒仓列表
    pub fn from_silos(silos: &[Silo]) -> Self {
        if silos.is_empty() {
            return Self::default();
        }
        Self {
            silo_count: silos.len(),
            active_count: silos.iter().filter(|s| s.is_active).count(),
            average_level_percent: silos.iter().map(|s| s.current_level_percent).sum::<f64>()
                / silos.len() as f64,
            total_level_tons: silos.iter().map(|s| s.current_level_tons).sum(),
        }
    }
}
