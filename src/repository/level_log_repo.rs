// ==========================================
// 磨粉厂筒仓台账系统 - 料位台账仓储
// ==========================================
// 红线: 只提供追加与查询, 不提供更新/删除
// 排序: recorded_at 为秒级, 同秒内按写入顺序 (rowid)
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::level_log::SiloLevelLog;
use crate::domain::types::LevelSource;
use crate::repository::error::{enum_column, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const LOG_COLUMNS: &str = r#"
    id, silo_id, level_percent, level_tons, source,
    production_session_id, recorded_by, recorded_at, notes
"#;

pub struct LevelLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LevelLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<SiloLevelLog> {
        let source: String = row.get(4)?;
        let recorded_at: String = row.get(7)?;
        Ok(SiloLevelLog {
            id: row.get(0)?,
            silo_id: row.get(1)?,
            level_percent: row.get(2)?,
            level_tons: row.get(3)?,
            source: enum_column(LevelSource::from_db_str(&source), 4)?,
            production_session_id: row.get(5)?,
            recorded_by: row.get(6)?,
            recorded_at: parse_ts(&recorded_at, 7)?,
            notes: row.get(8)?,
        })
    }

    /// 追加一条台账
    pub fn insert_tx(conn: &Connection, log: &SiloLevelLog) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO silo_level_logs (
                id, silo_id, level_percent, level_tons, source,
                production_session_id, recorded_by, recorded_at, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                log.id,
                log.silo_id,
                log.level_percent,
                log.level_tons,
                log.source.as_str(),
                log.production_session_id,
                log.recorded_by,
                format_ts(&log.recorded_at),
                log.notes,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, log_id: &str) -> RepositoryResult<Option<SiloLevelLog>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM silo_level_logs WHERE id = ?1", LOG_COLUMNS);
        let log = conn
            .query_row(&sql, params![log_id], Self::map_row)
            .optional()?;
        Ok(log)
    }

    /// 最近的台账 (新 -> 旧)
    pub fn find_by_silo(&self, silo_id: &str, limit: usize) -> RepositoryResult<Vec<SiloLevelLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM silo_level_logs
               WHERE silo_id = ?1
               ORDER BY recorded_at DESC, rowid DESC
               LIMIT ?2"#,
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![silo_id, limit as i64], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 料位曲线 (旧 -> 新)
    pub fn find_history(
        &self,
        silo_id: &str,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<SiloLevelLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM silo_level_logs
               WHERE silo_id = ?1 AND recorded_at >= ?2
               ORDER BY recorded_at ASC, rowid ASC"#,
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![silo_id, format_ts(&since)], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 生产会话关联的台账 (旧 -> 新)
    pub fn find_by_session(&self, session_id: &str) -> RepositoryResult<Vec<SiloLevelLog>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM silo_level_logs
               WHERE production_session_id = ?1
               ORDER BY recorded_at ASC, rowid ASC"#,
            LOG_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    pub fn count_by_silo(&self, silo_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM silo_level_logs WHERE silo_id = ?1",
            params![silo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn setup_test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO silos (id, code, name, silo_type) VALUES ('S1', '1DU01', '1号仓', 'mill_product')",
            [],
        )
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn make_log(id: &str, percent: f64, at: NaiveDateTime) -> SiloLevelLog {
        SiloLevelLog {
            id: id.to_string(),
            silo_id: "S1".to_string(),
            level_percent: percent,
            level_tons: Some(percent / 2.0),
            source: LevelSource::Manual,
            production_session_id: None,
            recorded_by: None,
            recorded_at: at,
            notes: None,
        }
    }

    #[test]
    fn test_insert_and_order() {
        let conn = setup_test_db();
        {
            let c = conn.lock().unwrap();
            LevelLogRepository::insert_tx(&c, &make_log("L1", 10.0, t0())).unwrap();
            // 同一秒写入两条, 按写入顺序排序
            LevelLogRepository::insert_tx(&c, &make_log("L2", 20.0, t0())).unwrap();
            LevelLogRepository::insert_tx(&c, &make_log("L3", 30.0, t0() + Duration::hours(1)))
                .unwrap();
        }
        let repo = LevelLogRepository::new(conn);

        let recent = repo.find_by_silo("S1", 10).unwrap();
        let ids: Vec<_> = recent.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L3", "L2", "L1"]);

        let limited = repo.find_by_silo("S1", 1).unwrap();
        assert_eq!(limited.len(), 1);

        let history = repo.find_history("S1", t0()).unwrap();
        let ids: Vec<_> = history.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L1", "L2", "L3"]);

        let later = repo.find_history("S1", t0() + Duration::minutes(30)).unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(repo.count_by_silo("S1").unwrap(), 3);
    }

    #[test]
    fn test_ledger_is_append_only() {
        let conn = setup_test_db();
        {
            let c = conn.lock().unwrap();
            LevelLogRepository::insert_tx(&c, &make_log("L1", 10.0, t0())).unwrap();

            let upd = c
                .execute("UPDATE silo_level_logs SET level_percent = 99 WHERE id = 'L1'", [])
                .unwrap_err();
            assert!(matches!(
                RepositoryError::from(upd),
                RepositoryError::BusinessRuleViolation(_)
            ));

            let del = c
                .execute("DELETE FROM silo_level_logs WHERE id = 'L1'", [])
                .unwrap_err();
            assert!(matches!(
                RepositoryError::from(del),
                RepositoryError::BusinessRuleViolation(_)
            ));
        }
        let repo = LevelLogRepository::new(conn);
        let log = repo.find_by_id("L1").unwrap().expect("台账应存在");
        assert_eq!(log.level_percent, 10.0);
    }

    #[test]
    fn test_percent_out_of_range_rejected_by_schema() {
        let conn = setup_test_db();
        let c = conn.lock().unwrap();
        let err = LevelLogRepository::insert_tx(&c, &make_log("L1", 120.0, t0())).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_silo_rejected_by_foreign_key() {
        let conn = setup_test_db();
        let c = conn.lock().unwrap();
        let mut log = make_log("L1", 10.0, t0());
        log.silo_id = "nope".to_string();
        let err = LevelLogRepository::insert_tx(&c, &log).unwrap_err();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));
    }
}
