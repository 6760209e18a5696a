// ==========================================
// 磨粉厂筒仓台账系统 - 包装出库处理器
// ==========================================
// 流程: 校验 -> 读筒仓 -> 库存检查 -> 写包装记录 -> 更新料位 -> 追加台账
// 红线: 五步在同一 IMMEDIATE 事务内, 全部提交或全部回滚
// 库存检查: STRICT 拒绝透支; AUTO_FIX 告警并将料位截断为 0
// ==========================================

use crate::config::{ConfigManager, StockCheckMode};
use crate::domain::level_log::NewLevelLog;
use crate::domain::packaging::{
    packaging_ledger_note, CreatePackagingRequest, PackagingEntry, PackagingFilter,
    PackagingOutcome,
};
use crate::domain::report::{DateRange, ReportPeriod};
use crate::domain::types::LevelSource;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::events::{ChangeEvent, ChangeTable, OptionalEventPublisher};
use crate::engine::ledger::LedgerRecorder;
use crate::engine::repositories::LedgerRepositories;
use crate::repository::{PackagingEntryRepository, SiloRepository};
use chrono::NaiveDateTime;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// PackagingProcessor - 包装出库处理器
// ==========================================
pub struct PackagingProcessor {
    repos: LedgerRepositories,
    config: Arc<ConfigManager>,
    events: OptionalEventPublisher,
}

impl PackagingProcessor {
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

    /// 请求校验 (不做 I/O)
    pub fn validate(req: &CreatePackagingRequest) -> LedgerResult<()> {
        if !req.quantity_tons.is_finite() || req.quantity_tons <= 0.0 {
            return Err(LedgerError::Validation(format!(
                "包装吨位必须大于 0: {}",
                req.quantity_tons
            )));
        }
        if let Some(bags) = req.quantity_bags {
            if bags <= 0 {
                return Err(LedgerError::Validation(format!("包装袋数必须大于 0: {}", bags)));
            }
        }
        for (field, value) in [
            ("silo_id", &req.silo_id),
            ("product_id", &req.product_id),
            ("worker_id", &req.worker_id),
            ("created_by", &req.created_by),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::Validation(format!("{} 不能为空", field)));
            }
        }
        Ok(())
    }

    /// 创建包装记录并扣减筒仓料位
    ///
    /// # 返回
    /// 包装记录、扣减后的料位、对应的台账条目
    ///
    /// # 错误
    /// - Validation: 吨位/袋数非法
    /// - NotFound: 筒仓不存在
    /// - InsufficientStock: STRICT 模式下出库量大于当前库存 (不写入任何数据)
    pub fn create_entry(
        &self,
        req: CreatePackagingRequest,
        now: NaiveDateTime,
    ) -> LedgerResult<PackagingOutcome> {
        Self::validate(&req)?;

        let mode = self
            .config
            .get_stock_check_mode()
            .map_err(|e| LedgerError::Config(e.to_string()))?;

        let outcome = self.repos.tx_manager.run_in_transaction(|conn| {
            let silo = SiloRepository::find_by_id_tx(conn, &req.silo_id)?
                .ok_or_else(|| LedgerError::not_found("筒仓", &req.silo_id))?;

            if req.quantity_tons > silo.current_level_tons {
                match mode {
                    StockCheckMode::Strict => {
                        return Err(LedgerError::InsufficientStock {
                            silo_id: silo.id.clone(),
                            requested: req.quantity_tons,
                            available: silo.current_level_tons,
                        });
                    }
                    StockCheckMode::AutoFix => {
                        tracing::warn!(
                            silo_id = %silo.id,
                            requested = req.quantity_tons,
                            available = silo.current_level_tons,
                            "出库量超过当前库存, 料位截断为 0"
                        );
                    }
                }
            }

            let entry = PackagingEntry {
                id: Uuid::new_v4().to_string(),
                silo_id: silo.id.clone(),
                product_id: req.product_id.clone(),
                worker_id: req.worker_id.clone(),
                package_type: req.package_type,
                quantity_tons: req.quantity_tons,
                quantity_bags: req.quantity_bags,
                shift: req.shift.clone(),
                recorded_at: now,
                created_by: req.created_by.clone(),
                notes: req.notes.clone(),
            };
            PackagingEntryRepository::insert_tx(conn, &entry)?;

            let level = silo.level_after_outflow(req.quantity_tons);
            SiloRepository::update_level_tx(conn, &silo.id, level.percent, level.tons, None, now)?;

            let ledger_entry = LedgerRecorder::record_tx(
                conn,
                NewLevelLog::new(&silo.id, level.percent, Some(level.tons), LevelSource::Calculated)
                    .recorded_by(Some(&req.created_by))
                    .notes(Some(packaging_ledger_note(req.quantity_tons, req.package_type))),
                now,
            )?;

            Ok(PackagingOutcome {
                entry,
                silo_level_after: level,
                ledger_entry,
            })
        })?;

        tracing::info!(
            entry_id = %outcome.entry.id,
            silo_id = %outcome.entry.silo_id,
            package_type = %outcome.entry.package_type,
            quantity_tons = outcome.entry.quantity_tons,
            level_tons = outcome.silo_level_after.tons,
            level_percent = outcome.silo_level_after.percent,
            "包装出库完成"
        );
        self.events.publish_all([
            ChangeEvent::insert(ChangeTable::PackagingEntries, &outcome.entry.id, now),
            ChangeEvent::update(ChangeTable::Silos, &outcome.entry.silo_id, now),
            ChangeEvent::insert(ChangeTable::SiloLevelLogs, &outcome.ledger_entry.id, now),
        ]);
        Ok(outcome)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 包装记录列表 (新 -> 旧), 未指定 limit 时使用配置
    pub fn list_entries(&self, filter: &PackagingFilter) -> LedgerResult<Vec<PackagingEntry>> {
        let mut filter = filter.clone();
        if filter.limit.is_none() {
            filter.limit = Some(
                self.config
                    .get_packaging_list_limit()
                    .map_err(|e| LedgerError::Config(e.to_string()))?,
            );
        }
        let entries = self.repos.packaging_repo.list(&filter)?;
        tracing::debug!(count = entries.len(), "查询包装记录");
        Ok(entries)
    }

    /// 当日包装记录
    pub fn list_today(&self, now: NaiveDateTime) -> LedgerResult<Vec<PackagingEntry>> {
        let range = DateRange::for_period(ReportPeriod::Today, now);
        Ok(self.repos.packaging_repo.list_in_range(&range)?)
    }

    pub fn get_entry(&self, entry_id: &str) -> LedgerResult<PackagingEntry> {
        self.repos
            .packaging_repo
            .find_by_id(entry_id)?
            .ok_or_else(|| LedgerError::not_found("包装记录", entry_id))
    }
}
