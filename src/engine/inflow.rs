// ==========================================
// 磨粉厂筒仓台账系统 - 生产入库处理器
// ==========================================
// 状态机: active ⇄ paused, {active, paused} -> {completed, cancelled}
// 产量: 小时产量 × 有效时长, 报表时计算
// 入库: 会话结束后通过 reconcile_session 一次性计入目标筒仓 (每个会话至多一次)
// 红线: 所有写入在同一事务内完成; 配置在事务外读取
// ==========================================

use crate::config::ConfigManager;
use crate::domain::level_log::NewLevelLog;
use crate::domain::production::{ProductionSession, Reconciliation, StartSessionRequest};
use crate::domain::types::{LevelSource, ProductionStatus};
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::events::{ChangeEvent, ChangeTable, OptionalEventPublisher};
use crate::engine::ledger::LedgerRecorder;
use crate::engine::repositories::LedgerRepositories;
use crate::repository::{
    MillRepository, ProductRepository, ProductionSessionRepository, SiloRepository,
};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::sync::Arc;
use uuid::Uuid;

/// 生产开始标记的台账备注
pub const SESSION_STARTED_NOTE: &str = "生产开始";

// ==========================================
// ProductionProcessor - 生产入库处理器
// ==========================================
pub struct ProductionProcessor {
    repos: LedgerRepositories,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl ProductionProcessor {
    pub fn new(
        repos: LedgerRepositories,
        config: Arc<ConfigManager>,
        events: OptionalEventPublisher,
    ) -> Self {
        Self {
            repos,
            config,
            events,
        }
    }

    // ==========================================
    // 开始 / 暂停 / 恢复 / 结束
    // ==========================================

    /// 开始生产
    ///
    /// # 规则
    /// - hourly_rate_tons > 0
    /// - 磨机、产品、目标筒仓必须存在, 目标筒仓必须启用
    /// - 开启产品规则校验且筒仓配置了规则时, 产品必须在允许列表中
    ///
    /// # 副作用
    /// 同一事务内写入会话与一条“生产开始”标记台账 (calculated, 0%)
    pub fn start_session(
        &self,
        req: StartSessionRequest,
        now: NaiveDateTime,
    ) -> LedgerResult<ProductionSession> {
        if !req.hourly_rate_tons.is_finite() || req.hourly_rate_tons <= 0.0 {
            return Err(LedgerError::Validation(format!(
                "小时产量必须大于 0: {}",
                req.hourly_rate_tons
            )));
        }
        if req.created_by.trim().is_empty() {
            return Err(LedgerError::Validation("created_by 不能为空".to_string()));
        }

        let enforce_rules = self
            .config
            .get_enforce_product_rules()
            .map_err(|e| LedgerError::Config(e.to_string()))?;

        let (session, marker) = self.repos.tx_manager.run_in_transaction(|conn| {
            if MillRepository::find_by_id_tx(conn, &req.mill_id)?.is_none() {
                return Err(LedgerError::not_found("磨机", &req.mill_id));
            }
            if ProductRepository::find_by_id_tx(conn, &req.product_id)?.is_none() {
                return Err(LedgerError::not_found("产品", &req.product_id));
            }
            let silo = SiloRepository::find_by_id_tx(conn, &req.target_silo_id)?
                .ok_or_else(|| LedgerError::not_found("筒仓", &req.target_silo_id))?;
            if !silo.is_active {
                return Err(LedgerError::Validation(format!(
                    "目标筒仓未启用: {}",
                    silo.code
                )));
            }

            if enforce_rules {
                let rules = SiloRepository::list_product_rules_tx(conn, &silo.id)?;
                if !rules.is_empty() && !rules.iter().any(|r| r.product_id == req.product_id) {
                    return Err(LedgerError::BusinessRule(format!(
                        "筒仓 {} 不允许存放产品 {}",
                        silo.code, req.product_id
                    )));
                }
            }

            let session = ProductionSession {
                id: Uuid::new_v4().to_string(),
                mill_id: req.mill_id.clone(),
                product_id: req.product_id.clone(),
                target_silo_id: silo.id.clone(),
                hourly_rate_tons: req.hourly_rate_tons,
                started_at: now,
                ended_at: None,
                status: ProductionStatus::Active,
                paused_at: None,
                paused_seconds: 0,
                notes: req.notes.clone(),
                created_by: req.created_by.clone(),
                updated_at: now,
            };
            ProductionSessionRepository::insert_tx(conn, &session)?;

            let marker = LedgerRecorder::record_tx(
                conn,
                NewLevelLog::new(&silo.id, 0.0, None, LevelSource::Calculated)
                    .recorded_by(Some(&req.created_by))
                    .session(&session.id)
                    .notes(Some(SESSION_STARTED_NOTE.to_string())),
                now,
            )?;
            Ok((session, marker))
        })?;

        tracing::info!(
            session_id = %session.id,
            mill_id = %session.mill_id,
            silo_id = %session.target_silo_id,
            hourly_rate_tons = session.hourly_rate_tons,
            "生产开始"
        );
        self.events.publish_all([
            ChangeEvent::insert(ChangeTable::ProductionSessions, &session.id, now),
            ChangeEvent::insert(ChangeTable::SiloLevelLogs, &marker.id, now),
        ]);
        Ok(session)
    }

    /// 暂停生产 (active -> paused)
    pub fn pause_session(&self, session_id: &str, now: NaiveDateTime) -> LedgerResult<ProductionSession> {
        let session = self.repos.tx_manager.run_in_transaction(|conn| {
            let mut session = Self::load_tx(conn, session_id)?;
            Self::check_transition(&session, ProductionStatus::Paused)?;
            Self::check_not_before_start(&session, now)?;

            session.status = ProductionStatus::Paused;
            session.paused_at = Some(now);
            session.updated_at = now;
            ProductionSessionRepository::update_state_tx(conn, &session)?;
            Ok::<_, LedgerError>(session)
        })?;

        tracing::info!(session_id = %session.id, "生产暂停");
        self.events
            .publish(ChangeEvent::update(ChangeTable::ProductionSessions, &session.id, now));
        Ok(session)
    }

    /// 恢复生产 (paused -> active), 暂停时长计入 paused_seconds
    pub fn resume_session(&self, session_id: &str, now: NaiveDateTime) -> LedgerResult<ProductionSession> {
        let session = self.repos.tx_manager.run_in_transaction(|conn| {
            let mut session = Self::load_tx(conn, session_id)?;
            Self::check_transition(&session, ProductionStatus::Active)?;

            Self::close_pause_interval(&mut session, now);
            session.status = ProductionStatus::Active;
            session.updated_at = now;
            ProductionSessionRepository::update_state_tx(conn, &session)?;
            Ok::<_, LedgerError>(session)
        })?;

        tracing::info!(
            session_id = %session.id,
            paused_seconds = session.paused_seconds,
            "生产恢复"
        );
        self.events
            .publish(ChangeEvent::update(ChangeTable::ProductionSessions, &session.id, now));
        Ok(session)
    }

    /// 结束生产 (completed / cancelled), 终态
    ///
    /// 不修改筒仓料位; 若开启 `production.auto_reconcile_on_complete`,
    /// completed 会话在同一事务内完成入库对账。
    pub fn end_session(
        &self,
        session_id: &str,
        status: ProductionStatus,
        actor: Option<&str>,
        now: NaiveDateTime,
    ) -> LedgerResult<ProductionSession> {
        if !status.is_terminal() {
            return Err(LedgerError::Validation(format!(
                "结束状态只能是 completed 或 cancelled: {}",
                status
            )));
        }

        let auto_reconcile = status == ProductionStatus::Completed
            && self
                .config
                .get_auto_reconcile_on_complete()
                .map_err(|e| LedgerError::Config(e.to_string()))?;

        let (session, reconciliation) = self.repos.tx_manager.run_in_transaction(|conn| {
            let mut session = Self::load_tx(conn, session_id)?;
            Self::check_transition(&session, status)?;
            Self::check_not_before_start(&session, now)?;

            Self::close_pause_interval(&mut session, now);
            session.status = status;
            session.ended_at = Some(now);
            session.updated_at = now;
            ProductionSessionRepository::update_state_tx(conn, &session)?;

            let reconciliation = if auto_reconcile {
                Some(Self::reconcile_tx(conn, &session, actor, now)?)
            } else {
                None
            };
            Ok::<_, LedgerError>((session, reconciliation))
        })?;

        tracing::info!(
            session_id = %session.id,
            status = %session.status,
            produced_tons = ?session.produced_tons(),
            "生产结束"
        );
        self.events
            .publish(ChangeEvent::update(ChangeTable::ProductionSessions, &session.id, now));
        if let Some(rec) = &reconciliation {
            self.publish_reconciliation(&session, rec, now);
        }
        Ok(session)
    }

    // ==========================================
    // 入库对账
    // ==========================================

    /// 将已结束会话的产量计入目标筒仓
    ///
    /// # 规则
    /// - 会话必须已结束且状态为 completed
    /// - 每个会话至多对账一次
    /// - 容量已知时料位封顶于容量, 超出部分记为 overflow_tons
    pub fn reconcile_session(
        &self,
        session_id: &str,
        actor: Option<&str>,
        now: NaiveDateTime,
    ) -> LedgerResult<Reconciliation> {
        let (session, rec) = self.repos.tx_manager.run_in_transaction(|conn| {
            let session = Self::load_tx(conn, session_id)?;
            let rec = Self::reconcile_tx(conn, &session, actor, now)?;
            Ok::<_, LedgerError>((session, rec))
        })?;

        self.publish_reconciliation(&session, &rec, now);
        Ok(rec)
    }

    fn reconcile_tx(
        conn: &Connection,
        session: &ProductionSession,
        actor: Option<&str>,
        now: NaiveDateTime,
    ) -> LedgerResult<Reconciliation> {
        if session.status != ProductionStatus::Completed {
            return Err(LedgerError::BusinessRule(format!(
                "只有已完成的会话可以入库: {} ({})",
                session.id, session.status
            )));
        }
        if ProductionSessionRepository::find_reconciliation_tx(conn, &session.id)?.is_some() {
            return Err(LedgerError::BusinessRule(format!(
                "会话已入库, 不能重复对账: {}",
                session.id
            )));
        }
        let quantity = session
            .produced_tons()
            .ok_or_else(|| LedgerError::BusinessRule(format!("会话未结束: {}", session.id)))?;

        let silo = SiloRepository::find_by_id_tx(conn, &session.target_silo_id)?
            .ok_or_else(|| LedgerError::not_found("筒仓", &session.target_silo_id))?;
        let inflow = silo.level_after_inflow(quantity);
        if inflow.overflow_tons > 0.0 {
            tracing::warn!(
                session_id = %session.id,
                silo_id = %silo.id,
                overflow_tons = inflow.overflow_tons,
                "入库量超过筒仓容量, 超出部分未计入"
            );
        }

        SiloRepository::update_level_tx(
            conn,
            &silo.id,
            inflow.level.percent,
            inflow.level.tons,
            None,
            now,
        )?;
        let log = LedgerRecorder::record_tx(
            conn,
            NewLevelLog::new(
                &silo.id,
                inflow.level.percent,
                Some(inflow.level.tons),
                LevelSource::Calculated,
            )
            .recorded_by(actor)
            .session(&session.id)
            .notes(Some(format!("生产入库: {:.3} 吨", quantity))),
            now,
        )?;

        let rec = Reconciliation {
            session_id: session.id.clone(),
            level_log_id: log.id,
            quantity_tons: quantity,
            applied_tons: inflow.applied_tons,
            overflow_tons: inflow.overflow_tons,
            reconciled_by: actor.map(str::to_string),
            reconciled_at: now,
        };
        ProductionSessionRepository::insert_reconciliation_tx(conn, &rec)?;

        tracing::info!(
            session_id = %session.id,
            silo_id = %silo.id,
            quantity_tons = quantity,
            level_tons = inflow.level.tons,
            level_percent = inflow.level.percent,
            "生产入库完成"
        );
        Ok(rec)
    }

    fn publish_reconciliation(&self, session: &ProductionSession, rec: &Reconciliation, now: NaiveDateTime) {
        self.events.publish_all([
            ChangeEvent::update(ChangeTable::Silos, &session.target_silo_id, now),
            ChangeEvent::insert(ChangeTable::SiloLevelLogs, &rec.level_log_id, now),
        ]);
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_session(&self, session_id: &str) -> LedgerResult<ProductionSession> {
        self.repos
            .session_repo
            .find_by_id(session_id)?
            .ok_or_else(|| LedgerError::not_found("生产会话", session_id))
    }

    /// 会话列表 (新 -> 旧)
    pub fn list_sessions(&self, mill_id: Option<&str>, limit: Option<usize>) -> LedgerResult<Vec<ProductionSession>> {
        let limit = match limit {
            Some(n) => n,
            None => self
                .config
                .get_session_list_limit()
                .map_err(|e| LedgerError::Config(e.to_string()))?,
        };
        Ok(self.repos.session_repo.list(mill_id, limit)?)
    }

    /// 未结束的会话 (active / paused)
    pub fn list_active_sessions(&self, mill_id: Option<&str>) -> LedgerResult<Vec<ProductionSession>> {
        Ok(self.repos.session_repo.list_open(mill_id)?)
    }

    pub fn get_reconciliation(&self, session_id: &str) -> LedgerResult<Option<Reconciliation>> {
        Ok(self.repos.session_repo.find_reconciliation(session_id)?)
    }

    // ==========================================
    // 辅助
    // ==========================================

    fn load_tx(conn: &Connection, session_id: &str) -> LedgerResult<ProductionSession> {
        ProductionSessionRepository::find_by_id_tx(conn, session_id)?
            .ok_or_else(|| LedgerError::not_found("生产会话", session_id))
    }

    fn check_transition(session: &ProductionSession, next: ProductionStatus) -> LedgerResult<()> {
        if session.is_ended() || !session.status.can_transition_to(next) {
            return Err(LedgerError::InvalidStateTransition {
                from: session.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    fn check_not_before_start(session: &ProductionSession, now: NaiveDateTime) -> LedgerResult<()> {
        if now < session.started_at {
            return Err(LedgerError::Validation(format!(
                "时间早于会话开始时间: {} < {}",
                now, session.started_at
            )));
        }
        Ok(())
    }

    fn close_pause_interval(session: &mut ProductionSession, now: NaiveDateTime) {
        if let Some(paused_at) = session.paused_at.take() {
            session.paused_seconds += (now - paused_at).num_seconds().max(0);
        }
    }
}
