// ==========================================
// 磨粉厂筒仓台账系统 - 筒仓仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// 说明: *_tx 关联函数供事务闭包使用
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::master::SiloProductRule;
use crate::domain::silo::Silo;
use crate::domain::types::SiloType;
use crate::repository::error::{enum_column, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const SILO_COLUMNS: &str = r#"
    id, code, name, silo_type, capacity_meters, capacity_tons,
    current_level_percent, current_level_tons, mill_id, is_active, notes,
    revision, created_at, updated_at, created_by
"#;

// ==========================================
// SiloRepository - 筒仓仓储
// ==========================================
pub struct SiloRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SiloRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<Silo> {
        let silo_type: String = row.get(3)?;
        let created_at: String = row.get(12)?;
        let updated_at: String = row.get(13)?;
        Ok(Silo {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            silo_type: enum_column(SiloType::from_db_str(&silo_type), 3)?,
            capacity_meters: row.get(4)?,
            capacity_tons: row.get(5)?,
            current_level_percent: row.get(6)?,
            current_level_tons: row.get(7)?,
            mill_id: row.get(8)?,
            is_active: row.get(9)?,
            notes: row.get(10)?,
            revision: row.get(11)?,
            created_at: parse_ts(&created_at, 12)?,
            updated_at: parse_ts(&updated_at, 13)?,
            created_by: row.get(14)?,
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, silo: &Silo) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO silos (
                id, code, name, silo_type, capacity_meters, capacity_tons,
                current_level_percent, current_level_tons, mill_id, is_active, notes,
                revision, created_at, updated_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                silo.id,
                silo.code,
                silo.name,
                silo.silo_type.as_str(),
                silo.capacity_meters,
                silo.capacity_tons,
                silo.current_level_percent,
                silo.current_level_tons,
                silo.mill_id,
                silo.is_active,
                silo.notes,
                silo.revision,
                format_ts(&silo.created_at),
                format_ts(&silo.updated_at),
                silo.created_by,
            ],
        )?;
        Ok(())
    }

    /// 写回基础信息列 (料位与 revision 不变)
    pub fn update_info_tx(conn: &Connection, silo: &Silo) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"UPDATE silos
               SET name = ?1, silo_type = ?2, capacity_meters = ?3, capacity_tons = ?4,
                   mill_id = ?5, is_active = ?6, notes = ?7, updated_at = ?8
               WHERE id = ?9"#,
            params![
                silo.name,
                silo.silo_type.as_str(),
                silo.capacity_meters,
                silo.capacity_tons,
                silo.mill_id,
                silo.is_active,
                silo.notes,
                format_ts(&silo.updated_at),
                silo.id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Silo", &silo.id));
        }
        Ok(())
    }

    /// 引用该筒仓的历史记录数 (料位日志 + 包装 + 生产)
    pub fn count_history_tx(conn: &Connection, silo_id: &str) -> RepositoryResult<i64> {
        let count = conn.query_row(
            r#"SELECT
                 (SELECT COUNT(*) FROM silo_level_logs WHERE silo_id = ?1)
               + (SELECT COUNT(*) FROM packaging_entries WHERE silo_id = ?1)
               + (SELECT COUNT(*) FROM production_sessions WHERE target_silo_id = ?1)"#,
            params![silo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 删除筒仓及其产品规则
    pub fn delete_tx(conn: &Connection, silo_id: &str) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM silo_product_rules WHERE silo_id = ?1",
            params![silo_id],
        )?;
        let rows = conn.execute("DELETE FROM silos WHERE id = ?1", params![silo_id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Silo", silo_id));
        }
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, silo_id: &str) -> RepositoryResult<Option<Silo>> {
        let sql = format!("SELECT {} FROM silos WHERE id = ?1", SILO_COLUMNS);
        let silo = conn
            .query_row(&sql, params![silo_id], Self::map_row)
            .optional()?;
        Ok(silo)
    }

    /// 写入当前料位 (revision + 1)
    ///
    /// `expected_revision` 为 Some 时做乐观锁校验。
    /// 返回写入后的 revision。
    pub fn update_level_tx(
        conn: &Connection,
        silo_id: &str,
        level_percent: f64,
        level_tons: f64,
        expected_revision: Option<i64>,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let ts = format_ts(&now);
        let rows = match expected_revision {
            Some(expected) => conn.execute(
                r#"UPDATE silos
                   SET current_level_percent = ?1, current_level_tons = ?2,
                       revision = revision + 1, updated_at = ?3
                   WHERE id = ?4 AND revision = ?5"#,
                params![level_percent, level_tons, ts, silo_id, expected],
            )?,
            None => conn.execute(
                r#"UPDATE silos
                   SET current_level_percent = ?1, current_level_tons = ?2,
                       revision = revision + 1, updated_at = ?3
                   WHERE id = ?4"#,
                params![level_percent, level_tons, ts, silo_id],
            )?,
        };

        let actual: Option<i64> = conn
            .query_row(
                "SELECT revision FROM silos WHERE id = ?1",
                params![silo_id],
                |row| row.get(0),
            )
            .optional()?;

        match (rows, actual, expected_revision) {
            (_, None, _) => Err(RepositoryError::not_found("Silo", silo_id)),
            (0, Some(actual), Some(expected)) => Err(RepositoryError::OptimisticLockFailure {
                entity_id: silo_id.to_string(),
                expected,
                actual,
            }),
            (_, Some(revision), _) => Ok(revision),
        }
    }

    pub fn list_product_rules_tx(
        conn: &Connection,
        silo_id: &str,
    ) -> RepositoryResult<Vec<SiloProductRule>> {
        let mut stmt = conn.prepare(
            r#"SELECT id, silo_id, product_id, created_at
               FROM silo_product_rules
               WHERE silo_id = ?1
               ORDER BY created_at, id"#,
        )?;
        let rules = stmt
            .query_map(params![silo_id], |row| {
                let created_at: String = row.get(3)?;
                Ok(SiloProductRule {
                    id: row.get(0)?,
                    silo_id: row.get(1)?,
                    product_id: row.get(2)?,
                    created_at: parse_ts(&created_at, 3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rules)
    }

    // ==========================================
    // 写入操作
    // ==========================================

    pub fn insert(&self, silo: &Silo) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, silo)
    }

    pub fn add_product_rule(&self, rule: &SiloProductRule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO silo_product_rules (id, silo_id, product_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                rule.id,
                rule.silo_id,
                rule.product_id,
                format_ts(&rule.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn remove_product_rule(&self, silo_id: &str, product_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM silo_product_rules WHERE silo_id = ?1 AND product_id = ?2",
            params![silo_id, product_id],
        )?;
        Ok(rows)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, silo_id: &str) -> RepositoryResult<Option<Silo>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, silo_id)
    }

    pub fn find_by_code(&self, code: &str) -> RepositoryResult<Option<Silo>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM silos WHERE code = ?1", SILO_COLUMNS);
        let silo = conn
            .query_row(&sql, params![code], Self::map_row)
            .optional()?;
        Ok(silo)
    }

    /// 筒仓列表 (按编码排序)
    pub fn list(&self, mill_id: Option<&str>, active_only: bool) -> RepositoryResult<Vec<Silo>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM silos
               WHERE (?1 IS NULL OR mill_id = ?1)
                 AND (?2 = 0 OR is_active = 1)
               ORDER BY code"#,
            SILO_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let silos = stmt
            .query_map(params![mill_id, active_only], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(silos)
    }

    pub fn list_product_rules(&self, silo_id: &str) -> RepositoryResult<Vec<SiloProductRule>> {
        let conn = self.get_conn()?;
        Self::list_product_rules_tx(&conn, silo_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn setup_test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn make_silo(id: &str, code: &str, capacity: Option<f64>) -> Silo {
        Silo {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("{}仓", code),
            silo_type: SiloType::MillProduct,
            capacity_meters: None,
            capacity_tons: capacity,
            current_level_percent: 20.0,
            current_level_tons: 10.0,
            mill_id: None,
            is_active: true,
            notes: None,
            revision: 0,
            created_at: ts(),
            updated_at: ts(),
            created_by: None,
        }
    }

    #[test]
    fn test_insert_and_find_silo_成功() {
        let repo = SiloRepository::new(setup_test_db());
        repo.insert(&make_silo("S1", "1DU01", Some(50.0))).unwrap();

        let found = repo.find_by_id("S1").unwrap().expect("筒仓应存在");
        assert_eq!(found.code, "1DU01");
        assert_eq!(found.capacity_tons, Some(50.0));
        assert_eq!(found.silo_type, SiloType::MillProduct);
        assert_eq!(found.created_at, ts());

        assert!(repo.find_by_id("missing").unwrap().is_none());
        assert!(repo.find_by_code("1DU01").unwrap().is_some());
    }

    #[test]
    fn test_update_level_revision() {
        let conn = setup_test_db();
        let repo = SiloRepository::new(conn.clone());
        repo.insert(&make_silo("S1", "1DU01", Some(50.0))).unwrap();

        let c = conn.lock().unwrap();
        let rev = SiloRepository::update_level_tx(&c, "S1", 14.0, 7.0, None, ts()).unwrap();
        assert_eq!(rev, 1);

        let rev = SiloRepository::update_level_tx(&c, "S1", 10.0, 5.0, Some(1), ts()).unwrap();
        assert_eq!(rev, 2);

        // 过期的 revision
        let err = SiloRepository::update_level_tx(&c, "S1", 0.0, 0.0, Some(1), ts()).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::OptimisticLockFailure { expected: 1, actual: 2, .. }
        ));

        let err = SiloRepository::update_level_tx(&c, "nope", 0.0, 0.0, None, ts()).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_negative_tons_rejected_by_schema() {
        let conn = setup_test_db();
        let repo = SiloRepository::new(conn.clone());
        repo.insert(&make_silo("S1", "1DU01", Some(50.0))).unwrap();

        let c = conn.lock().unwrap();
        let err = SiloRepository::update_level_tx(&c, "S1", 0.0, -1.0, None, ts()).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_list_filters() {
        let repo = SiloRepository::new(setup_test_db());
        let mut inactive = make_silo("S2", "1DU02", None);
        inactive.is_active = false;
        repo.insert(&make_silo("S1", "1DU01", Some(50.0))).unwrap();
        repo.insert(&inactive).unwrap();

        assert_eq!(repo.list(None, false).unwrap().len(), 2);
        let active = repo.list(None, true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "S1");
        assert!(repo.list(Some("M9"), false).unwrap().is_empty());
    }
}
