// ==========================================
// 磨粉厂筒仓台账系统 - 生产会话仓储
// ==========================================
// 红线: 已结束的会话不可再修改 (数据库触发器兜底)
// ==========================================

use crate::db::{format_ts, parse_opt_ts, parse_ts};
use crate::domain::production::{ProductionSession, Reconciliation};
use crate::domain::types::ProductionStatus;
use crate::repository::error::{enum_column, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const SESSION_COLUMNS: &str = r#"
    id, mill_id, product_id, target_silo_id, hourly_rate_tons,
    started_at, ended_at, status, paused_at, paused_seconds,
    notes, created_by, updated_at
"#;

pub struct ProductionSessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionSessionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub(crate) fn map_row(row: &Row) -> SqliteResult<ProductionSession> {
        let started_at: String = row.get(5)?;
        let status: String = row.get(7)?;
        let updated_at: String = row.get(12)?;
        Ok(ProductionSession {
            id: row.get(0)?,
            mill_id: row.get(1)?,
            product_id: row.get(2)?,
            target_silo_id: row.get(3)?,
            hourly_rate_tons: row.get(4)?,
            started_at: parse_ts(&started_at, 5)?,
            ended_at: parse_opt_ts(row.get(6)?, 6)?,
            status: enum_column(ProductionStatus::from_db_str(&status), 7)?,
            paused_at: parse_opt_ts(row.get(8)?, 8)?,
            paused_seconds: row.get(9)?,
            notes: row.get(10)?,
            created_by: row.get(11)?,
            updated_at: parse_ts(&updated_at, 12)?,
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, session: &ProductionSession) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO production_sessions (
                id, mill_id, product_id, target_silo_id, hourly_rate_tons,
                started_at, ended_at, status, paused_at, paused_seconds,
                notes, created_by, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                session.id,
                session.mill_id,
                session.product_id,
                session.target_silo_id,
                session.hourly_rate_tons,
                format_ts(&session.started_at),
                session.ended_at.as_ref().map(format_ts),
                session.status.as_str(),
                session.paused_at.as_ref().map(format_ts),
                session.paused_seconds,
                session.notes,
                session.created_by,
                format_ts(&session.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        session_id: &str,
    ) -> RepositoryResult<Option<ProductionSession>> {
        let sql = format!(
            "SELECT {} FROM production_sessions WHERE id = ?1",
            SESSION_COLUMNS
        );
        let session = conn
            .query_row(&sql, params![session_id], Self::map_row)
            .optional()?;
        Ok(session)
    }

    /// 写回状态字段 (status / ended_at / paused_at / paused_seconds)
    pub fn update_state_tx(conn: &Connection, session: &ProductionSession) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"UPDATE production_sessions
               SET status = ?1, ended_at = ?2, paused_at = ?3,
                   paused_seconds = ?4, updated_at = ?5
               WHERE id = ?6"#,
            params![
                session.status.as_str(),
                session.ended_at.as_ref().map(format_ts),
                session.paused_at.as_ref().map(format_ts),
                session.paused_seconds,
                format_ts(&session.updated_at),
                session.id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionSession", &session.id));
        }
        Ok(())
    }

    pub fn insert_reconciliation_tx(
        conn: &Connection,
        rec: &Reconciliation,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO production_reconciliations (
                session_id, level_log_id, quantity_tons, applied_tons,
                overflow_tons, reconciled_by, reconciled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                rec.session_id,
                rec.level_log_id,
                rec.quantity_tons,
                rec.applied_tons,
                rec.overflow_tons,
                rec.reconciled_by,
                format_ts(&rec.reconciled_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_reconciliation_tx(
        conn: &Connection,
        session_id: &str,
    ) -> RepositoryResult<Option<Reconciliation>> {
        let rec = conn
            .query_row(
                r#"SELECT session_id, level_log_id, quantity_tons, applied_tons,
                          overflow_tons, reconciled_by, reconciled_at
                   FROM production_reconciliations
                   WHERE session_id = ?1"#,
                params![session_id],
                |row| {
                    let reconciled_at: String = row.get(6)?;
                    Ok(Reconciliation {
                        session_id: row.get(0)?,
                        level_log_id: row.get(1)?,
                        quantity_tons: row.get(2)?,
                        applied_tons: row.get(3)?,
                        overflow_tons: row.get(4)?,
                        reconciled_by: row.get(5)?,
                        reconciled_at: parse_ts(&reconciled_at, 6)?,
                    })
                },
            )
            .optional()?;
        Ok(rec)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, session_id: &str) -> RepositoryResult<Option<ProductionSession>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, session_id)
    }

    pub fn find_reconciliation(&self, session_id: &str) -> RepositoryResult<Option<Reconciliation>> {
        let conn = self.get_conn()?;
        Self::find_reconciliation_tx(&conn, session_id)
    }

    /// 会话列表 (新 -> 旧)
    pub fn list(&self, mill_id: Option<&str>, limit: usize) -> RepositoryResult<Vec<ProductionSession>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM production_sessions
               WHERE (?1 IS NULL OR mill_id = ?1)
               ORDER BY started_at DESC, rowid DESC
               LIMIT ?2"#,
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params![mill_id, limit as i64], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(sessions)
    }

    /// 未结束的会话 (active / paused)
    pub fn list_open(&self, mill_id: Option<&str>) -> RepositoryResult<Vec<ProductionSession>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM production_sessions
               WHERE ended_at IS NULL AND (?1 IS NULL OR mill_id = ?1)
               ORDER BY started_at DESC, rowid DESC"#,
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params![mill_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(sessions)
    }
}
