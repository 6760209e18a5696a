// ==========================================
// 磨粉厂筒仓台账系统 - 主数据维护
// ==========================================
// 职责: 磨机 / 筒仓 / 人员的新建、修改、删除
// 红线: 实体与其流程图节点在同一事务内增删
// 删除: 已有台账或生产记录的实体只能停用, 不能删除
// ==========================================

use crate::domain::flow::FlowNode;
use crate::domain::master::{Mill, MillUpdate, NewMill, User, UserStats, UserUpdate};
use crate::domain::silo::{NewSilo, Silo, SiloUpdate};
use crate::domain::types::FlowEntityType;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::events::{ChangeEvent, ChangeTable, OptionalEventPublisher};
use crate::engine::repositories::LedgerRepositories;
use crate::repository::{FlowRepository, MillRepository, SiloRepository, UserRepository};
use chrono::NaiveDateTime;
use uuid::Uuid;

fn require_text(field: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{} 不能为空", field)));
    }
    Ok(())
}

fn require_positive(field: &str, value: f64) -> LedgerResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(LedgerError::Validation(format!("{}必须大于 0: {}", field, value)));
    }
    Ok(())
}

/// 删除实体时清理掉的流程图元素
struct RemovedFlow {
    nodes: Vec<String>,
    connections: Vec<String>,
}

impl RemovedFlow {
    fn events(&self, now: NaiveDateTime) -> Vec<ChangeEvent> {
        self.nodes
            .iter()
            .map(|id| ChangeEvent::delete(ChangeTable::FlowNodes, id, now))
            .chain(
                self.connections
                    .iter()
                    .map(|id| ChangeEvent::delete(ChangeTable::FlowConnections, id, now)),
            )
            .collect()
    }
}

// ==========================================
// MasterDataManager - 主数据维护
// ==========================================
pub struct MasterDataManager {
    repos: LedgerRepositories,
    events: OptionalEventPublisher,
}

impl MasterDataManager {
    pub fn new(repos: LedgerRepositories, events: OptionalEventPublisher) -> Self {
        Self { repos, events }
    }

    // ==========================================
    // 磨机
    // ==========================================

    /// 新建磨机, 同时在流程图上放置默认节点
    pub fn create_mill(&self, req: NewMill, now: NaiveDateTime) -> LedgerResult<Mill> {
        require_text("code", &req.code)?;
        require_text("name", &req.name)?;
        require_text("mill_type", &req.mill_type)?;
        if req.separator_count < 0 {
            return Err(LedgerError::Validation(format!(
                "分级机数量不能为负: {}",
                req.separator_count
            )));
        }
        if let Some(rate) = req.default_hourly_rate {
            require_positive("默认小时产量", rate)?;
        }

        let mill = Mill {
            id: Uuid::new_v4().to_string(),
            code: req.code.trim().to_string(),
            name: req.name.trim().to_string(),
            mill_type: req.mill_type.trim().to_string(),
            feed_source: req.feed_source,
            separator_count: req.separator_count,
            default_hourly_rate: req.default_hourly_rate,
            sends_to_coating: req.sends_to_coating,
            is_active: true,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        };
        let node_id = Uuid::new_v4().to_string();
        let node = FlowNode::default_for(node_id, &mill.id, FlowEntityType::Mill, now);

        self.repos.tx_manager.run_in_transaction(|conn| {
            MillRepository::insert_tx(conn, &mill)?;
            FlowRepository::insert_node_tx(conn, &node)?;
            Ok::<_, LedgerError>(())
        })?;

        tracing::info!(mill_id = %mill.id, code = %mill.code, "新建磨机");
        self.events.publish_all([
            ChangeEvent::insert(ChangeTable::Mills, &mill.id, now),
            ChangeEvent::insert(ChangeTable::FlowNodes, &node.id, now),
        ]);
        Ok(mill)
    }

    /// 更新磨机 (仅更新 Some 字段)
    pub fn update_mill(
        &self,
        mill_id: &str,
        update: MillUpdate,
        now: NaiveDateTime,
    ) -> LedgerResult<Mill> {
        if update.is_empty() {
            return Err(LedgerError::Validation("没有需要更新的字段".to_string()));
        }
        if let Some(rate) = update.default_hourly_rate {
            require_positive("默认小时产量", rate)?;
        }
        if let Some(name) = &update.name {
            require_text("name", name)?;
        }
        if let Some(mill_type) = &update.mill_type {
            require_text("mill_type", mill_type)?;
        }
        if let Some(count) = update.separator_count {
            if count < 0 {
                return Err(LedgerError::Validation(format!("分级机数量不能为负: {}", count)));
            }
        }

        let mill = self.repos.tx_manager.run_in_transaction(|conn| {
            MillRepository::update_tx(conn, mill_id, &update, now)?;
            let mill = MillRepository::find_by_id_tx(conn, mill_id)?
                .ok_or_else(|| LedgerError::not_found("磨机", mill_id))?;
            Ok::<_, LedgerError>(mill)
        })?;

        tracing::info!(mill_id, "更新磨机");
        self.events
            .publish(ChangeEvent::update(ChangeTable::Mills, mill_id, now));
        Ok(mill)
    }

    /// 删除磨机, 连同其分级机、流程图节点与连线
    ///
    /// # 错误
    /// - BusinessRule: 已有生产记录或所属筒仓
    pub fn delete_mill(&self, mill_id: &str, now: NaiveDateTime) -> LedgerResult<()> {
        let removed = self.repos.tx_manager.run_in_transaction(|conn| {
            if MillRepository::find_by_id_tx(conn, mill_id)?.is_none() {
                return Err(LedgerError::not_found("磨机", mill_id));
            }
            let references = MillRepository::count_references_tx(conn, mill_id)?;
            if references > 0 {
                return Err(LedgerError::BusinessRule(format!(
                    "磨机 {} 仍有 {} 条生产记录或所属筒仓, 请改为停用",
                    mill_id, references
                )));
            }
            let (nodes, connections) =
                FlowRepository::delete_entity_tx(conn, mill_id, FlowEntityType::Mill)?;
            MillRepository::delete_tx(conn, mill_id)?;
            Ok(RemovedFlow { nodes, connections })
        })?;

        tracing::info!(mill_id, connections = removed.connections.len(), "删除磨机");
        self.events
            .publish(ChangeEvent::delete(ChangeTable::Mills, mill_id, now));
        self.events.publish_all(removed.events(now));
        Ok(())
    }

    // ==========================================
    // 筒仓
    // ==========================================

    /// 新建筒仓 (空仓), 同时在流程图上放置默认节点
    pub fn create_silo(&self, req: NewSilo, now: NaiveDateTime) -> LedgerResult<Silo> {
        require_text("code", &req.code)?;
        require_text("name", &req.name)?;
        if let Some(tons) = req.capacity_tons {
            require_positive("容量(吨)", tons)?;
        }
        if let Some(meters) = req.capacity_meters {
            require_positive("容量(米)", meters)?;
        }

        let silo = Silo {
            id: Uuid::new_v4().to_string(),
            code: req.code.trim().to_string(),
            name: req.name.trim().to_string(),
            silo_type: req.silo_type,
            capacity_meters: req.capacity_meters,
            capacity_tons: req.capacity_tons,
            current_level_percent: 0.0,
            current_level_tons: 0.0,
            mill_id: req.mill_id,
            is_active: true,
            notes: req.notes,
            revision: 0,
            created_at: now,
            updated_at: now,
            created_by: req.created_by,
        };
        let node_id = Uuid::new_v4().to_string();
        let node = FlowNode::default_for(node_id, &silo.id, FlowEntityType::Silo, now);

        self.repos.tx_manager.run_in_transaction(|conn| {
            if let Some(mill_id) = &silo.mill_id {
                if MillRepository::find_by_id_tx(conn, mill_id)?.is_none() {
                    return Err(LedgerError::not_found("磨机", mill_id));
                }
            }
            SiloRepository::insert_tx(conn, &silo)?;
            FlowRepository::insert_node_tx(conn, &node)?;
            Ok::<_, LedgerError>(())
        })?;

        tracing::info!(silo_id = %silo.id, code = %silo.code, "新建筒仓");
        self.events.publish_all([
            ChangeEvent::insert(ChangeTable::Silos, &silo.id, now),
            ChangeEvent::insert(ChangeTable::FlowNodes, &node.id, now),
        ]);
        Ok(silo)
    }

    /// 更新筒仓基础信息
    ///
    /// 料位不变; 新容量小于当前库存时拒绝
    pub fn update_silo(
        &self,
        silo_id: &str,
        update: SiloUpdate,
        now: NaiveDateTime,
    ) -> LedgerResult<Silo> {
        if update.is_empty() {
            return Err(LedgerError::Validation("没有需要更新的字段".to_string()));
        }
        if let Some(name) = &update.name {
            require_text("name", name)?;
        }
        if let Some(Some(tons)) = update.capacity_tons {
            require_positive("容量(吨)", tons)?;
        }
        if let Some(Some(meters)) = update.capacity_meters {
            require_positive("容量(米)", meters)?;
        }

        let silo = self.repos.tx_manager.run_in_transaction(|conn| {
            let mut silo = SiloRepository::find_by_id_tx(conn, silo_id)?
                .ok_or_else(|| LedgerError::not_found("筒仓", silo_id))?;
            if let Some(Some(mill_id)) = &update.mill_id {
                if MillRepository::find_by_id_tx(conn, mill_id)?.is_none() {
                    return Err(LedgerError::not_found("磨机", mill_id));
                }
            }
            silo.apply_update(&update, now)
                .map_err(LedgerError::Validation)?;
            SiloRepository::update_info_tx(conn, &silo)?;
            Ok(silo)
        })?;

        tracing::info!(silo_id, is_active = silo.is_active, "更新筒仓");
        self.events
            .publish(ChangeEvent::update(ChangeTable::Silos, silo_id, now));
        Ok(silo)
    }

    /// 删除筒仓, 连同其产品规则、流程图节点与连线
    ///
    /// # 错误
    /// - BusinessRule: 已有料位、包装或生产记录
    pub fn delete_silo(&self, silo_id: &str, now: NaiveDateTime) -> LedgerResult<()> {
        let removed = self.repos.tx_manager.run_in_transaction(|conn| {
            if SiloRepository::find_by_id_tx(conn, silo_id)?.is_none() {
                return Err(LedgerError::not_found("筒仓", silo_id));
            }
            let history = SiloRepository::count_history_tx(conn, silo_id)?;
            if history > 0 {
                return Err(LedgerError::BusinessRule(format!(
                    "筒仓 {} 已有 {} 条历史记录, 请改为停用",
                    silo_id, history
                )));
            }
            let (nodes, connections) =
                FlowRepository::delete_entity_tx(conn, silo_id, FlowEntityType::Silo)?;
            SiloRepository::delete_tx(conn, silo_id)?;
            Ok(RemovedFlow { nodes, connections })
        })?;

        tracing::info!(silo_id, connections = removed.connections.len(), "删除筒仓");
        self.events
            .publish(ChangeEvent::delete(ChangeTable::Silos, silo_id, now));
        self.events.publish_all(removed.events(now));
        Ok(())
    }

    // ==========================================
    // 人员
    // ==========================================

    pub fn update_user(
        &self,
        user_id: &str,
        update: UserUpdate,
        now: NaiveDateTime,
    ) -> LedgerResult<User> {
        if update.is_empty() {
            return Err(LedgerError::Validation("没有需要更新的字段".to_string()));
        }
        if let Some(name) = &update.full_name {
            require_text("full_name", name)?;
        }
        let update = UserUpdate {
            full_name: update.full_name.map(|n| n.trim().to_string()),
            ..update
        };

        let user = self.repos.tx_manager.run_in_transaction(|conn| {
            UserRepository::update_tx(conn, user_id, &update)?;
            let user = UserRepository::find_by_id_tx(conn, user_id)?
                .ok_or_else(|| LedgerError::not_found("人员", user_id))?;
            Ok::<_, LedgerError>(user)
        })?;

        tracing::info!(
            user_id,
            role = user.role.as_str(),
            is_active = user.is_active,
            "更新人员"
        );
        self.events
            .publish(ChangeEvent::update(ChangeTable::Users, user_id, now));
        Ok(user)
    }

    /// 停用人员 (历史记录仍引用该人员, 不做物理删除)
    pub fn deactivate_user(&self, user_id: &str, now: NaiveDateTime) -> LedgerResult<User> {
        let update = UserUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        self.update_user(user_id, update, now)
    }

    /// 人员统计 (含停用)
    pub fn user_stats(&self) -> LedgerResult<UserStats> {
        let users = self.repos.user_repo.list_all()?;
        Ok(UserStats::from_users(&users))
    }
}
