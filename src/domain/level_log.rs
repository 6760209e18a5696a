// ==========================================
// 磨粉厂筒仓台账系统 - 料位台账条目
// ==========================================
// 红线: 只追加, 不更新, 不删除
// 对齐: silo_level_logs 表
// ==========================================

use crate::domain::types::LevelSource;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// SiloLevelLog - 料位台账条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloLevelLog {
    pub id: String,
    pub silo_id: String,
    pub level_percent: f64,
    pub level_tons: Option<f64>,
    pub source: LevelSource,
    pub production_session_id: Option<String>,
    pub recorded_by: Option<String>,
    pub recorded_at: NaiveDateTime,
    pub notes: Option<String>,
}

/// 台账写入参数
#[derive(Debug, Clone, PartialEq)]
pub struct NewLevelLog {
    pub silo_id: String,
    pub level_percent: f64,
    pub level_tons: Option<f64>,
    pub source: LevelSource,
    pub recorded_by: Option<String>,
    pub production_session_id: Option<String>,
    pub notes: Option<String>,
}

impl NewLevelLog {
    pub fn new(silo_id: &str, level_percent: f64, level_tons: Option<f64>, source: LevelSource) -> Self {
        Self {
            silo_id: silo_id.to_string(),
            level_percent,
            level_tons,
            source,
            recorded_by: None,
            production_session_id: None,
            notes: None,
        }
    }

    pub fn recorded_by(mut self, actor: Option<&str>) -> Self {
        self.recorded_by = actor.map(str::to_string);
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.production_session_id = Some(session_id.to_string());
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}
