// ==========================================
// 磨粉厂筒仓台账系统 - 报表读模型仓储
// ==========================================
// 职责: 一次查询带出报表需要的名称字段 (LEFT JOIN)
// 红线: 不做聚合, 聚合在 ReportEngine 中完成
// ==========================================

use crate::db::format_ts;
use crate::domain::packaging::PackagingEntry;
use crate::domain::production::ProductionSession;
use crate::domain::report::DateRange;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::packaging_repo::PackagingEntryRepository;
use crate::repository::production_repo::ProductionSessionRepository;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex, MutexGuard};

/// 生产会话 + 磨机/产品名称
#[derive(Debug, Clone)]
pub struct ProductionRecord {
    pub session: ProductionSession,
    pub mill_code: String,
    pub mill_name: String,
    pub product_code: String,
    pub product_name: String,
}

/// 包装记录 + 筒仓/产品/人员名称
#[derive(Debug, Clone)]
pub struct PackagingRecord {
    pub entry: PackagingEntry,
    pub silo_code: String,
    pub silo_name: String,
    pub product_code: String,
    pub product_name: String,
    pub worker_name: Option<String>,
}

pub struct ReportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReportRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 区间内开始且已结束的会话
    pub fn production_records(&self, range: &DateRange) -> RepositoryResult<Vec<ProductionRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT s.id, s.mill_id, s.product_id, s.target_silo_id, s.hourly_rate_tons,
                   s.started_at, s.ended_at, s.status, s.paused_at, s.paused_seconds,
                   s.notes, s.created_by, s.updated_at,
                   COALESCE(m.code, ''), COALESCE(m.name, ''),
                   COALESCE(p.code, ''), COALESCE(p.name, '')
            FROM production_sessions s
            LEFT JOIN mills m ON m.id = s.mill_id
            LEFT JOIN products p ON p.id = s.product_id
            WHERE s.started_at >= ?1 AND s.started_at <= ?2 AND s.ended_at IS NOT NULL
            ORDER BY s.started_at ASC, s.rowid ASC
            "#,
        )?;
        let records = stmt
            .query_map(
                params![format_ts(&range.start), format_ts(&range.end)],
                |row| {
                    Ok(ProductionRecord {
                        session: ProductionSessionRepository::map_row(row)?,
                        mill_code: row.get(13)?,
                        mill_name: row.get(14)?,
                        product_code: row.get(15)?,
                        product_name: row.get(16)?,
                    })
                },
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }

    /// 区间内的包装记录
    pub fn packaging_records(&self, range: &DateRange) -> RepositoryResult<Vec<PackagingRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT e.id, e.silo_id, e.product_id, e.worker_id, e.package_type, e.quantity_tons,
                   e.quantity_bags, e.shift, e.recorded_at, e.created_by, e.notes,
                   COALESCE(s.code, ''), COALESCE(s.name, ''),
                   COALESCE(p.code, ''), COALESCE(p.name, ''),
                   u.full_name
            FROM packaging_entries e
            LEFT JOIN silos s ON s.id = e.silo_id
            LEFT JOIN products p ON p.id = e.product_id
            LEFT JOIN users u ON u.id = e.worker_id
            WHERE e.recorded_at >= ?1 AND e.recorded_at <= ?2
            ORDER BY e.recorded_at ASC, e.rowid ASC
            "#,
        )?;
        let records = stmt
            .query_map(
                params![format_ts(&range.start), format_ts(&range.end)],
                |row| {
                    Ok(PackagingRecord {
                        entry: PackagingEntryRepository::map_row(row)?,
                        silo_code: row.get(11)?,
                        silo_name: row.get(12)?,
                        product_code: row.get(13)?,
                        product_name: row.get(14)?,
                        worker_name: row.get(15)?,
                    })
                },
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}
