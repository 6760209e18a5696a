// ==========================================
// 磨粉厂筒仓台账系统 - 流程图 API
// ==========================================
// 职责: 流程图节点/连线的持久化 (不做图算法)
// ==========================================

use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::current_time;
use crate::api::error::{require_non_empty, ApiError, ApiResult};
use crate::domain::flow::{FlowConnection, FlowEntity, FlowNode, NewFlowConnection};
use crate::domain::types::FlowEntityType;
use crate::engine::events::{ChangeEvent, ChangeKind, ChangeTable, OptionalEventPublisher};
use crate::repository::FlowRepository;

/// 流程图API
pub struct FlowApi {
    flow_repo: Arc<FlowRepository>,
    events: OptionalEventPublisher,
}

impl FlowApi {
    pub fn new(flow_repo: Arc<FlowRepository>, events: OptionalEventPublisher) -> Self {
        Self { flow_repo, events }
    }

    fn check_position(x: f64, y: f64) -> ApiResult<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ApiError::InvalidInput(format!("节点坐标非法: ({}, {})", x, y)));
        }
        Ok(())
    }

    // ==========================================
    // 节点
    // ==========================================

    pub fn list_nodes(&self) -> ApiResult<Vec<FlowNode>> {
        Ok(self.flow_repo.list_nodes()?)
    }

    /// 创建节点, 同一实体只能有一个节点
    pub fn create_node(
        &self,
        entity_id: &str,
        entity_type: FlowEntityType,
        position_x: f64,
        position_y: f64,
        ui_data: Option<JsonValue>,
    ) -> ApiResult<FlowNode> {
        require_non_empty("实体ID", entity_id)?;
        Self::check_position(position_x, position_y)?;

        let now = current_time();
        let node = FlowNode {
            id: Uuid::new_v4().to_string(),
            entity_id: entity_id.to_string(),
            entity_type,
            position_x,
            position_y,
            ui_data: ui_data.unwrap_or_else(|| JsonValue::Object(Default::default())),
            created_at: now,
            updated_at: now,
        };
        self.flow_repo.insert_node(&node)?;

        tracing::info!(entity_id, entity_type = entity_type.as_str(), "创建流程图节点");
        self.events
            .publish(ChangeEvent::insert(ChangeTable::FlowNodes, &node.id, now));
        Ok(node)
    }

    /// 拖动节点后保存坐标
    pub fn update_node_position(
        &self,
        entity_id: &str,
        entity_type: FlowEntityType,
        position_x: f64,
        position_y: f64,
    ) -> ApiResult<()> {
        require_non_empty("实体ID", entity_id)?;
        Self::check_position(position_x, position_y)?;

        let now = current_time();
        let node_id = self.flow_repo.update_node_position(
            entity_id,
            entity_type,
            position_x,
            position_y,
            now,
        )?;
        tracing::debug!(entity_id, position_x, position_y, "更新节点坐标");
        self.events
            .publish(ChangeEvent::update(ChangeTable::FlowNodes, &node_id, now));
        Ok(())
    }

    // ==========================================
    // 连线
    // ==========================================

    pub fn list_connections(&self) -> ApiResult<Vec<FlowConnection>> {
        Ok(self.flow_repo.list_active_connections()?)
    }

    pub fn create_connection(&self, req: NewFlowConnection) -> ApiResult<FlowConnection> {
        require_non_empty("起点ID", &req.source_id)?;
        require_non_empty("终点ID", &req.target_id)?;
        if req.source_id == req.target_id && req.source_type == req.target_type {
            return Err(ApiError::InvalidInput("连线起点与终点不能相同".to_string()));
        }

        let now = current_time();
        let connection = FlowConnection {
            id: Uuid::new_v4().to_string(),
            source_id: req.source_id,
            source_type: req.source_type,
            source_handle: req.source_handle,
            target_id: req.target_id,
            target_type: req.target_type,
            target_handle: req.target_handle,
            connection_rules: req.connection_rules,
            is_active: true,
            created_at: now,
            updated_at: now,
            created_by: req.created_by,
        };
        self.flow_repo.insert_connection(&connection)?;

        tracing::info!(
            source_id = %connection.source_id,
            target_id = %connection.target_id,
            "创建流程图连线"
        );
        self.events.publish(ChangeEvent::insert(
            ChangeTable::FlowConnections,
            &connection.id,
            now,
        ));
        Ok(connection)
    }

    pub fn delete_connection(&self, connection_id: &str) -> ApiResult<()> {
        require_non_empty("连线ID", connection_id)?;
        self.flow_repo.delete_connection(connection_id)?;

        tracing::info!(connection_id, "删除流程图连线");
        self.events.publish(ChangeEvent::new(
            ChangeTable::FlowConnections,
            ChangeKind::Delete,
            connection_id,
            current_time(),
        ));
        Ok(())
    }

    /// 可放入流程图的实体 (启用的磨机与筒仓)
    pub fn list_entities(&self) -> ApiResult<Vec<FlowEntity>> {
        Ok(self.flow_repo.list_entities()?)
    }
}
