// ==========================================
// 磨粉厂筒仓台账系统 - 包装记录仓储
// ==========================================
// 红线: 包装记录只插入, 不更新/删除 (数据库触发器兜底)
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::packaging::{PackagingEntry, PackagingFilter};
use crate::domain::report::DateRange;
use crate::domain::types::PackageType;
use crate::repository::error::{enum_column, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const ENTRY_COLUMNS: &str = r#"
    id, silo_id, product_id, worker_id, package_type, quantity_tons,
    quantity_bags, shift, recorded_at, created_by, notes
"#;

/// 未指定 limit 时的默认条数
pub const DEFAULT_LIST_LIMIT: usize = 100;

pub struct PackagingEntryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PackagingEntryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub(crate) fn map_row(row: &Row) -> SqliteResult<PackagingEntry> {
        let package_type: String = row.get(4)?;
        let recorded_at: String = row.get(8)?;
        Ok(PackagingEntry {
            id: row.get(0)?,
            silo_id: row.get(1)?,
            product_id: row.get(2)?,
            worker_id: row.get(3)?,
            package_type: enum_column(PackageType::from_db_str(&package_type), 4)?,
            quantity_tons: row.get(5)?,
            quantity_bags: row.get(6)?,
            shift: row.get(7)?,
            recorded_at: parse_ts(&recorded_at, 8)?,
            created_by: row.get(9)?,
            notes: row.get(10)?,
        })
    }

    pub fn insert_tx(conn: &Connection, entry: &PackagingEntry) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO packaging_entries (
                id, silo_id, product_id, worker_id, package_type, quantity_tons,
                quantity_bags, shift, recorded_at, created_by, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                entry.id,
                entry.silo_id,
                entry.product_id,
                entry.worker_id,
                entry.package_type.as_str(),
                entry.quantity_tons,
                entry.quantity_bags,
                entry.shift,
                format_ts(&entry.recorded_at),
                entry.created_by,
                entry.notes,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, entry_id: &str) -> RepositoryResult<Option<PackagingEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM packaging_entries WHERE id = ?1", ENTRY_COLUMNS);
        let entry = conn
            .query_row(&sql, params![entry_id], Self::map_row)
            .optional()?;
        Ok(entry)
    }

    /// 按条件查询 (新 -> 旧)
    pub fn list(&self, filter: &PackagingFilter) -> RepositoryResult<Vec<PackagingEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM packaging_entries
               WHERE (?1 IS NULL OR silo_id = ?1)
                 AND (?2 IS NULL OR worker_id = ?2)
                 AND (?3 IS NULL OR recorded_at >= ?3)
                 AND (?4 IS NULL OR recorded_at <= ?4)
               ORDER BY recorded_at DESC, rowid DESC
               LIMIT ?5"#,
            ENTRY_COLUMNS
        );
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(
                params![
                    filter.silo_id,
                    filter.worker_id,
                    filter.start.as_ref().map(format_ts),
                    filter.end.as_ref().map(format_ts),
                    limit,
                ],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 区间内全部记录 (旧 -> 新, 报表用)
    pub fn list_in_range(&self, range: &DateRange) -> RepositoryResult<Vec<PackagingEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM packaging_entries
               WHERE recorded_at >= ?1 AND recorded_at <= ?2
               ORDER BY recorded_at ASC, rowid ASC"#,
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(
                params![format_ts(&range.start), format_ts(&range.end)],
                Self::map_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 某人员自 since 以来的记录
    pub fn list_by_worker_since(
        &self,
        worker_id: &str,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<PackagingEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM packaging_entries
               WHERE worker_id = ?1 AND recorded_at >= ?2
               ORDER BY recorded_at ASC, rowid ASC"#,
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![worker_id, format_ts(&since)], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count_by_silo(&self, silo_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM packaging_entries WHERE silo_id = ?1",
            params![silo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
