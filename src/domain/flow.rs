// ==========================================
// 磨粉厂筒仓台账系统 - 工艺流程图持久化
// ==========================================
// 只保存节点坐标与连线, 不做图计算
// ==========================================

use crate::domain::types::FlowEntityType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub entity_id: String,
    pub entity_type: FlowEntityType,
    pub position_x: f64,
    pub position_y: f64,
    pub ui_data: JsonValue,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl FlowNode {
    /// 新建实体时的默认节点 (磨机在上排, 筒仓在下排)
    pub fn default_for(
        id: String,
        entity_id: &str,
        entity_type: FlowEntityType,
        now: NaiveDateTime,
    ) -> Self {
        let (x, y) = match entity_type {
            FlowEntityType::Silo => (100.0, 400.0),
            _ => (100.0, 100.0),
        };
        Self {
            id,
            entity_id: entity_id.to_string(),
            entity_type,
            position_x: x,
            position_y: y,
            ui_data: JsonValue::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConnection {
    pub id: String,
    pub source_id: String,
    pub source_type: FlowEntityType,
    pub source_handle: Option<String>,
    pub target_id: String,
    pub target_type: FlowEntityType,
    pub target_handle: Option<String>,
    pub connection_rules: Option<JsonValue>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub created_by: Option<String>,
}

/// 新建连线请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlowConnection {
    pub source_id: String,
    pub source_type: FlowEntityType,
    pub source_handle: Option<String>,
    pub target_id: String,
    pub target_type: FlowEntityType,
    pub target_handle: Option<String>,
    pub connection_rules: Option<JsonValue>,
    pub created_by: Option<String>,
}

/// 流程图可放置的实体 (磨机 + 筒仓)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntity {
    pub entity_id: String,
    pub entity_type: FlowEntityType,
    pub code: String,
    pub name: String,
}
