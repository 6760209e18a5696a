// ==========================================
// 磨粉厂筒仓台账系统 - 流程图仓储
// ==========================================
// flow_nodes: 以 (entity_id, entity_type) 唯一定位节点
// flow_connections: 只列出 is_active = 1 的连线
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::flow::{FlowConnection, FlowEntity, FlowNode};
use crate::domain::types::FlowEntityType;
use crate::repository::error::{enum_column, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};

fn json_column(raw: &str, idx: usize) -> SqliteResult<JsonValue> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub struct FlowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FlowRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_node(row: &Row) -> SqliteResult<FlowNode> {
        let entity_type: String = row.get(2)?;
        let ui_data: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(FlowNode {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            entity_type: enum_column(FlowEntityType::from_db_str(&entity_type), 2)?,
            position_x: row.get(3)?,
            position_y: row.get(4)?,
            ui_data: json_column(&ui_data, 5)?,
            created_at: parse_ts(&created_at, 6)?,
            updated_at: parse_ts(&updated_at, 7)?,
        })
    }

    fn map_connection(row: &Row) -> SqliteResult<FlowConnection> {
        let source_type: String = row.get(2)?;
        let target_type: String = row.get(5)?;
        let rules: Option<String> = row.get(7)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;
        Ok(FlowConnection {
            id: row.get(0)?,
            source_id: row.get(1)?,
            source_type: enum_column(FlowEntityType::from_db_str(&source_type), 2)?,
            source_handle: row.get(3)?,
            target_id: row.get(4)?,
            target_type: enum_column(FlowEntityType::from_db_str(&target_type), 5)?,
            target_handle: row.get(6)?,
            connection_rules: rules.map(|r| json_column(&r, 7)).transpose()?,
            is_active: row.get(8)?,
            created_at: parse_ts(&created_at, 9)?,
            updated_at: parse_ts(&updated_at, 10)?,
            created_by: row.get(11)?,
        })
    }

    // ==========================================
    // 节点
    // ==========================================

    pub fn list_nodes(&self) -> RepositoryResult<Vec<FlowNode>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, entity_id, entity_type, position_x, position_y, ui_data,
                      created_at, updated_at
               FROM flow_nodes
               ORDER BY created_at, rowid"#,
        )?;
        let nodes = stmt
            .query_map([], Self::map_node)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(nodes)
    }

    pub fn insert_node(&self, node: &FlowNode) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_node_tx(&conn, node)
    }

    pub fn insert_node_tx(conn: &Connection, node: &FlowNode) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO flow_nodes (
                id, entity_id, entity_type, position_x, position_y, ui_data, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                node.id,
                node.entity_id,
                node.entity_type.as_str(),
                node.position_x,
                node.position_y,
                node.ui_data.to_string(),
                format_ts(&node.created_at),
                format_ts(&node.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 更新节点坐标, 返回节点 id
    pub fn update_node_position(
        &self,
        entity_id: &str,
        entity_type: FlowEntityType,
        position_x: f64,
        position_y: f64,
        now: NaiveDateTime,
    ) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE flow_nodes
               SET position_x = ?1, position_y = ?2, updated_at = ?3
               WHERE entity_id = ?4 AND entity_type = ?5"#,
            params![
                position_x,
                position_y,
                format_ts(&now),
                entity_id,
                entity_type.as_str()
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("FlowNode", entity_id));
        }
        let id = conn.query_row(
            "SELECT id FROM flow_nodes WHERE entity_id = ?1 AND entity_type = ?2",
            params![entity_id, entity_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    // ==========================================
    // 连线
    // ==========================================

    pub fn list_active_connections(&self) -> RepositoryResult<Vec<FlowConnection>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, source_id, source_type, source_handle, target_id, target_type,
                      target_handle, connection_rules, is_active, created_at, updated_at, created_by
               FROM flow_connections
               WHERE is_active = 1
               ORDER BY created_at, rowid"#,
        )?;
        let connections = stmt
            .query_map([], Self::map_connection)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(connections)
    }

    pub fn insert_connection(&self, connection: &FlowConnection) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO flow_connections (
                id, source_id, source_type, source_handle, target_id, target_type,
                target_handle, connection_rules, is_active, created_at, updated_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                connection.id,
                connection.source_id,
                connection.source_type.as_str(),
                connection.source_handle,
                connection.target_id,
                connection.target_type.as_str(),
                connection.target_handle,
                connection.connection_rules.as_ref().map(|v| v.to_string()),
                connection.is_active,
                format_ts(&connection.created_at),
                format_ts(&connection.updated_at),
                connection.created_by,
            ],
        )?;
        Ok(())
    }

    pub fn delete_connection(&self, connection_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM flow_connections WHERE id = ?1",
            params![connection_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("FlowConnection", connection_id));
        }
        Ok(())
    }

    /// 删除实体的节点及所有以其为端点的连线 (含已停用连线)
    ///
    /// 返回 (被删节点 id, 被删连线 id)
    pub fn delete_entity_tx(
        conn: &Connection,
        entity_id: &str,
        entity_type: FlowEntityType,
    ) -> RepositoryResult<(Vec<String>, Vec<String>)> {
        let kind = entity_type.as_str();

        let mut stmt = conn.prepare(
            r#"SELECT id FROM flow_connections
               WHERE (source_id = ?1 AND source_type = ?2)
                  OR (target_id = ?1 AND target_type = ?2)"#,
        )?;
        let connection_ids = stmt
            .query_map(params![entity_id, kind], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        conn.execute(
            r#"DELETE FROM flow_connections
               WHERE (source_id = ?1 AND source_type = ?2)
                  OR (target_id = ?1 AND target_type = ?2)"#,
            params![entity_id, kind],
        )?;

        let mut stmt = conn.prepare(
            "SELECT id FROM flow_nodes WHERE entity_id = ?1 AND entity_type = ?2",
        )?;
        let node_ids = stmt
            .query_map(params![entity_id, kind], |row| row.get(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        conn.execute(
            "DELETE FROM flow_nodes WHERE entity_id = ?1 AND entity_type = ?2",
            params![entity_id, kind],
        )?;

        Ok((node_ids, connection_ids))
    }

    // ==========================================
    // 可放置实体
    // ==========================================

    /// 启用的磨机与筒仓
    pub fn list_entities(&self) -> RepositoryResult<Vec<FlowEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, 'mill' AS entity_type, code, name FROM mills WHERE is_active = 1
               UNION ALL
               SELECT id, 'silo' AS entity_type, code, name FROM silos WHERE is_active = 1
               ORDER BY entity_type, code"#,
        )?;
        let entities = stmt
            .query_map([], |row| {
                let entity_type: String = row.get(1)?;
                Ok(FlowEntity {
                    entity_id: row.get(0)?,
                    entity_type: enum_column(FlowEntityType::from_db_str(&entity_type), 1)?,
                    code: row.get(2)?,
                    name: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entities)
    }
}
