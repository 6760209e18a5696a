// ==========================================
// 磨粉厂筒仓台账系统 - 筒仓状态投影
// ==========================================
// 职责: 维护筒仓当前料位 (人工校正), 提供当前状态查询
// 红线: 当前值只存在于筒仓行; 台账是审计记录, 不回放
// 并发: 后写者生效; 携带 expected_revision 时做乐观锁校验
// ==========================================

use crate::config::ConfigManager;
use crate::domain::capacity::{percent_from_tons, LEVEL_TOLERANCE};
use crate::domain::level_log::{NewLevelLog, SiloLevelLog};
use crate::domain::master::SiloProductRule;
use crate::domain::report::days_before;
use crate::domain::silo::{Silo, SiloFleetSummary, SiloLevelView};
use crate::domain::types::LevelSource;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::events::{ChangeEvent, ChangeTable, OptionalEventPublisher};
use crate::engine::ledger::LedgerRecorder;
use crate::engine::repositories::LedgerRepositories;
use crate::repository::SiloRepository;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 人工设置料位请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequest {
    pub silo_id: String,
    pub level_percent: f64,
    pub level_tons: f64,
    pub recorded_by: String,
    pub notes: Option<String>,
    pub expected_revision: Option<i64>,
}

// ==========================================
// SiloStateProjector - 筒仓状态投影
// ==========================================
pub struct SiloStateProjector {
    repos: LedgerRepositories,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl SiloStateProjector {
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

    fn config_err(e: Box<dyn std::error::Error>) -> LedgerError {
        LedgerError::Config(e.to_string())
    }

    // ==========================================
    // 人工校正
    // ==========================================

    /// 人工设置料位
    ///
    /// # 规则
    /// - 0 ≤ level_percent ≤ 100, level_tons ≥ 0
    /// - 容量已知时 level_tons ≤ capacity_tons
    /// - 百分比与吨位不一致时照常写入, 偏差超过容差记录告警
    ///
    /// # 副作用
    /// 同一事务内更新筒仓并追加一条 manual 台账
    pub fn set_level(&self, req: SetLevelRequest, now: NaiveDateTime) -> LedgerResult<SiloLevelLog> {
        if !req.level_percent.is_finite() || !(0.0..=100.0).contains(&req.level_percent) {
            return Err(LedgerError::Validation(format!(
                "料位百分比必须在 [0, 100] 之间: {}",
                req.level_percent
            )));
        }
        if !req.level_tons.is_finite() || req.level_tons < 0.0 {
            return Err(LedgerError::Validation(format!(
                "料位吨位不能为负数: {}",
                req.level_tons
            )));
        }

        let (silo, log) = self.repos.tx_manager.run_in_transaction(|conn| {
            let silo = SiloRepository::find_by_id_tx(conn, &req.silo_id)?
                .ok_or_else(|| LedgerError::not_found("筒仓", &req.silo_id))?;

            if let Some(cap) = silo.capacity_tons.filter(|c| c.is_finite() && *c > 0.0) {
                if req.level_tons > cap {
                    return Err(LedgerError::Validation(format!(
                        "料位吨位 {} 超过筒仓容量 {}",
                        req.level_tons, cap
                    )));
                }
            }

            SiloRepository::update_level_tx(
                conn,
                &silo.id,
                req.level_percent,
                req.level_tons,
                req.expected_revision,
                now,
            )?;
            let log = LedgerRecorder::record_tx(
                conn,
                NewLevelLog::new(
                    &silo.id,
                    req.level_percent,
                    Some(req.level_tons),
                    LevelSource::Manual,
                )
                .recorded_by(Some(&req.recorded_by))
                .notes(req.notes.clone()),
                now,
            )?;
            Ok((silo, log))
        })?;

        if let Some(derived) = percent_from_tons(req.level_tons, silo.capacity_tons) {
            let drift = (derived - req.level_percent).abs();
            if drift > LEVEL_TOLERANCE {
                tracing::warn!(
                    silo_id = %silo.id,
                    level_percent = req.level_percent,
                    derived_percent = derived,
                    drift,
                    "料位百分比与吨位不一致"
                );
            }
        }

        tracing::info!(
            silo_id = %silo.id,
            level_percent = req.level_percent,
            level_tons = req.level_tons,
            recorded_by = %req.recorded_by,
            "人工设置料位"
        );
        self.events.publish_all([
            ChangeEvent::update(ChangeTable::Silos, &silo.id, now),
            ChangeEvent::insert(ChangeTable::SiloLevelLogs, &log.id, now),
        ]);
        Ok(log)
    }

    // ==========================================
    // 当前状态
    // ==========================================

    pub fn get_silo(&self, silo_id: &str) -> LedgerResult<Silo> {
        self.repos
            .silo_repo
            .find_by_id(silo_id)?
            .ok_or_else(|| LedgerError::not_found("筒仓", silo_id))
    }

    /// 当前料位视图 (含分档与偏差)
    pub fn current_state(&self, silo_id: &str) -> LedgerResult<SiloLevelView> {
        let thresholds = self
            .config
            .get_level_band_thresholds()
            .map_err(Self::config_err)?;
        Ok(self.get_silo(silo_id)?.level_view(&thresholds))
    }

    pub fn list_silos(&self, mill_id: Option<&str>) -> LedgerResult<Vec<Silo>> {
        Ok(self.repos.silo_repo.list(mill_id, false)?)
    }

    pub fn list_active_silos(&self, mill_id: Option<&str>) -> LedgerResult<Vec<Silo>> {
        Ok(self.repos.silo_repo.list(mill_id, true)?)
    }

    /// 启用筒仓的当前视图
    pub fn list_level_views(&self, mill_id: Option<&str>) -> LedgerResult<Vec<SiloLevelView>> {
        let thresholds = self
            .config
            .get_level_band_thresholds()
            .map_err(Self::config_err)?;
        Ok(self
            .list_active_silos(mill_id)?
            .iter()
            .map(|s| s.level_view(&thresholds))
            .collect())
    }

    pub fn fleet_summary(&self) -> LedgerResult<SiloFleetSummary> {
        let silos = self.repos.silo_repo.list(None, false)?;
        Ok(SiloFleetSummary::from_silos(&silos))
    }

    // ==========================================
    // 台账查询
    // ==========================================

    /// 最近台账 (新 -> 旧), limit 缺省取配置
    pub fn recent_logs(&self, silo_id: &str, limit: Option<usize>) -> LedgerResult<Vec<SiloLevelLog>> {
        let limit = match limit {
            Some(n) => n,
            None => self.config.get_level_log_limit().map_err(Self::config_err)?,
        };
        Ok(self.repos.level_log_repo.find_by_silo(silo_id, limit)?)
    }

    /// 料位历史 (旧 -> 新), days 缺省取配置
    pub fn level_history(
        &self,
        silo_id: &str,
        days: Option<i64>,
        now: NaiveDateTime,
    ) -> LedgerResult<Vec<SiloLevelLog>> {
        let days = match days {
            Some(d) if d > 0 => d,
            Some(d) => {
                return Err(LedgerError::Validation(format!("天数必须大于 0: {}", d)));
            }
            None => self.config.get_level_history_days().map_err(Self::config_err)?,
        };
        let since = days_before(now, days)
            .ok_or_else(|| LedgerError::Validation(format!("天数超出可查询范围: {}", days)))?;
        Ok(self.repos.level_log_repo.find_history(silo_id, since)?)
    }

    // ==========================================
    // 产品规则
    // ==========================================

    pub fn list_product_rules(&self, silo_id: &str) -> LedgerResult<Vec<SiloProductRule>> {
        Ok(self.repos.silo_repo.list_product_rules(silo_id)?)
    }

    pub fn add_product_rule(
        &self,
        silo_id: &str,
        product_id: &str,
        now: NaiveDateTime,
    ) -> LedgerResult<SiloProductRule> {
        self.get_silo(silo_id)?;
        if self.repos.product_repo.find_by_id(product_id)?.is_none() {
            return Err(LedgerError::not_found("产品", product_id));
        }
        let rule = SiloProductRule {
            id: Uuid::new_v4().to_string(),
            silo_id: silo_id.to_string(),
            product_id: product_id.to_string(),
            created_at: now,
        };
        self.repos.silo_repo.add_product_rule(&rule)?;
        tracing::info!(silo_id, product_id, "添加筒仓产品规则");
        self.events
            .publish(ChangeEvent::update(ChangeTable::Silos, silo_id, now));
        Ok(rule)
    }

    /// 删除产品规则, 返回是否存在
    pub fn remove_product_rule(
        &self,
        silo_id: &str,
        product_id: &str,
        now: NaiveDateTime,
    ) -> LedgerResult<bool> {
        let removed = self.repos.silo_repo.remove_product_rule(silo_id, product_id)? > 0;
        if removed {
            tracing::info!(silo_id, product_id, "删除筒仓产品规则");
            self.events
                .publish(ChangeEvent::update(ChangeTable::Silos, silo_id, now));
        }
        Ok(removed)
    }
}
