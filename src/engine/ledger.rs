// ==========================================
// 磨粉厂筒仓台账系统 - 料位台账记录器
// ==========================================
// 职责: 追加不可变的料位台账条目
// 红线: 只追加, 不修改历史; 不更新筒仓当前料位
// 说明: 处理器在自己的事务中调用 record_tx, 台账与筒仓更新一起提交
// ==========================================

use crate::domain::level_log::{NewLevelLog, SiloLevelLog};
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::events::{ChangeEvent, ChangeTable, OptionalEventPublisher};
use crate::engine::repositories::LedgerRepositories;
use crate::repository::{LevelLogRepository, SiloRepository};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

// ==========================================
// LedgerRecorder - 台账记录器
// ==========================================
pub struct LedgerRecorder {
    repos: LedgerRepositories,
    events: OptionalEventPublisher,
}

impl LedgerRecorder {
    pub fn new(repos: LedgerRepositories, events: OptionalEventPublisher) -> Self {
        Self { repos, events }
    }

    /// 台账数值校验 (不做 I/O)
    ///
    /// - level_percent ∈ [0, 100] 且为有限值
    /// - level_tons 若提供则 ≥ 0 且为有限值
    pub fn validate(entry: &NewLevelLog) -> LedgerResult<()> {
        if entry.silo_id.trim().is_empty() {
            return Err(LedgerError::Validation("silo_id 不能为空".to_string()));
        }
        if !entry.level_percent.is_finite() || !(0.0..=100.0).contains(&entry.level_percent) {
            return Err(LedgerError::Validation(format!(
                "料位百分比必须在 [0, 100] 之间: {}",
                entry.level_percent
            )));
        }
        if let Some(tons) = entry.level_tons {
            if !tons.is_finite() || tons < 0.0 {
                return Err(LedgerError::Validation(format!("料位吨位不能为负数: {}", tons)));
            }
        }
        Ok(())
    }

    /// 事务内追加一条台账
    ///
    /// 筒仓不存在时返回 Validation 错误。
    pub fn record_tx(
        conn: &Connection,
        entry: NewLevelLog,
        now: NaiveDateTime,
    ) -> LedgerResult<SiloLevelLog> {
        Self::validate(&entry)?;

        if SiloRepository::find_by_id_tx(conn, &entry.silo_id)?.is_none() {
            return Err(LedgerError::Validation(format!(
                "筒仓不存在: {}",
                entry.silo_id
            )));
        }

        let log = SiloLevelLog {
            id: Uuid::new_v4().to_string(),
            silo_id: entry.silo_id,
            level_percent: entry.level_percent,
            level_tons: entry.level_tons,
            source: entry.source,
            production_session_id: entry.production_session_id,
            recorded_by: entry.recorded_by,
            recorded_at: now,
            notes: entry.notes,
        };
        LevelLogRepository::insert_tx(conn, &log)?;

        tracing::debug!(
            log_id = %log.id,
            silo_id = %log.silo_id,
            source = %log.source,
            level_percent = log.level_percent,
            level_tons = ?log.level_tons,
            "料位台账已追加"
        );
        Ok(log)
    }

    /// 单独追加一条台账 (如仪表读数)
    pub fn record(&self, entry: NewLevelLog, now: NaiveDateTime) -> LedgerResult<SiloLevelLog> {
        let log = self
            .repos
            .tx_manager
            .run_in_transaction(|conn| Self::record_tx(conn, entry, now))?;

        tracing::info!(
            silo_id = %log.silo_id,
            source = %log.source,
            level_percent = log.level_percent,
            "记录料位台账"
        );
        self.events
            .publish(ChangeEvent::insert(ChangeTable::SiloLevelLogs, &log.id, now));
        Ok(log)
    }

    /// 最近的台账 (新 -> 旧)
    pub fn recent(&self, silo_id: &str, limit: usize) -> LedgerResult<Vec<SiloLevelLog>> {
        Ok(self.repos.level_log_repo.find_by_silo(silo_id, limit)?)
    }

    /// since 之后的台账 (旧 -> 新)
    pub fn history(&self, silo_id: &str, since: NaiveDateTime) -> LedgerResult<Vec<SiloLevelLog>> {
        Ok(self.repos.level_log_repo.find_history(silo_id, since)?)
    }

    pub fn count(&self, silo_id: &str) -> LedgerResult<i64> {
        Ok(self.repos.level_log_repo.count_by_silo(silo_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LevelSource;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    fn setup() -> LedgerRecorder {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO silos (id, code, name, silo_type, capacity_tons) VALUES ('S1', '1DU01', '1号仓', 'mill_product', 50)",
            [],
        )
        .unwrap();
        let repos = LedgerRepositories::from_connection(Arc::new(Mutex::new(conn)));
        LedgerRecorder::new(repos, OptionalEventPublisher::none())
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_record_成功() {
        let recorder = setup();
        let log = recorder
            .record(
                NewLevelLog::new("S1", 42.0, Some(21.0), LevelSource::Sensor),
                ts(),
            )
            .unwrap();
        assert_eq!(log.source, LevelSource::Sensor);
        assert_eq!(recorder.count("S1").unwrap(), 1);

        // 台账不修改筒仓当前值
        let silo = recorder.repos.silo_repo.find_by_id("S1").unwrap().unwrap();
        assert_eq!(silo.current_level_percent, 0.0);
    }

    #[test]
    fn test_record_missing_silo_is_validation_error() {
        let recorder = setup();
        let err = recorder
            .record(NewLevelLog::new("nope", 10.0, None, LevelSource::Manual), ts())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_record_out_of_range() {
        let recorder = setup();
        for bad in [-0.1, 100.1, f64::NAN] {
            let err = recorder
                .record(NewLevelLog::new("S1", bad, None, LevelSource::Manual), ts())
                .unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        }
        let err = recorder
            .record(NewLevelLog::new("S1", 10.0, Some(-1.0), LevelSource::Manual), ts())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(recorder.count("S1").unwrap(), 0);
    }
}
