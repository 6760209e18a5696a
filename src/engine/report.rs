// ==========================================
// 磨粉厂筒仓台账系统 - 报表引擎
// ==========================================
// 职责: 生产/包装/筒仓/人员报表聚合
// 说明: 聚合为纯函数, 查询只负责取数
// 生产量: 小时产量 × 有效时长 (扣除暂停), 未结束会话不计入
// ==========================================

use crate::domain::packaging::PackagingEntry;
use crate::domain::report::{
    days_before, DateRange, PackagingReportRow, ProductionReportRow, SiloReportRow,
    WorkerPackagingStats, WorkerReportRow,
};
use crate::domain::silo::Silo;
use crate::domain::types::PackageType;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::repositories::LedgerRepositories;
use crate::repository::{PackagingRecord, ProductionRecord};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ==========================================
// 纯聚合函数
// ==========================================

/// 生产报表: 按 (磨机, 产品) 汇总
pub fn aggregate_production(records: &[ProductionRecord]) -> Vec<ProductionReportRow> {
    let mut groups: BTreeMap<(String, String, String, String), ProductionReportRow> =
        BTreeMap::new();

    for r in records {
        let (Some(quantity), Some(hours)) = (r.session.produced_tons(), r.session.effective_hours())
        else {
            continue;
        };
        let key = (
            r.mill_code.clone(),
            r.product_code.clone(),
            r.session.mill_id.clone(),
            r.session.product_id.clone(),
        );
        let row = groups.entry(key).or_insert_with(|| ProductionReportRow {
            mill_id: r.session.mill_id.clone(),
            mill_code: r.mill_code.clone(),
            mill_name: r.mill_name.clone(),
            product_id: r.session.product_id.clone(),
            product_code: r.product_code.clone(),
            product_name: r.product_name.clone(),
            total_quantity: 0.0,
            total_duration_hours: 0.0,
            session_count: 0,
            avg_hourly_rate: 0.0,
        });
        row.total_quantity += quantity;
        row.total_duration_hours += hours;
        row.session_count += 1;
    }

    groups
        .into_values()
        .map(|mut row| {
            row.avg_hourly_rate = if row.total_duration_hours > 0.0 {
                row.total_quantity / row.total_duration_hours
            } else {
                0.0
            };
            row
        })
        .collect()
}

/// 包装报表: 按 (筒仓, 产品, 包装类型) 汇总
pub fn aggregate_packaging(records: &[PackagingRecord]) -> Vec<PackagingReportRow> {
    let mut groups: BTreeMap<(String, String, PackageType, String, String), PackagingReportRow> =
        BTreeMap::new();

    for r in records {
        let e = &r.entry;
        let key = (
            r.silo_code.clone(),
            r.product_code.clone(),
            e.package_type,
            e.silo_id.clone(),
            e.product_id.clone(),
        );
        let row = groups.entry(key).or_insert_with(|| PackagingReportRow {
            silo_id: e.silo_id.clone(),
            silo_code: r.silo_code.clone(),
            silo_name: r.silo_name.clone(),
            product_id: e.product_id.clone(),
            product_code: r.product_code.clone(),
            product_name: r.product_name.clone(),
            package_type: e.package_type,
            total_quantity: 0.0,
            total_bags: 0,
            entry_count: 0,
        });
        row.total_quantity += e.quantity_tons;
        row.total_bags += e.quantity_bags.unwrap_or(0);
        row.entry_count += 1;
    }

    groups.into_values().collect()
}

/// 筒仓报表: 每个启用筒仓的区间入库/出库与净变化
pub fn aggregate_silos(
    silos: &[Silo],
    production: &[ProductionRecord],
    packaging: &[PackagingRecord],
) -> Vec<SiloReportRow> {
    let mut produced: HashMap<&str, f64> = HashMap::new();
    for r in production {
        if let Some(q) = r.session.produced_tons() {
            *produced.entry(r.session.target_silo_id.as_str()).or_default() += q;
        }
    }
    let mut packed: HashMap<&str, f64> = HashMap::new();
    for r in packaging {
        *packed.entry(r.entry.silo_id.as_str()).or_default() += r.entry.quantity_tons;
    }

    silos
        .iter()
        .filter(|s| s.is_active)
        .map(|s| {
            let total_production = produced.get(s.id.as_str()).copied().unwrap_or(0.0);
            let total_packaging = packed.get(s.id.as_str()).copied().unwrap_or(0.0);
            SiloReportRow {
                silo_id: s.id.clone(),
                silo_code: s.code.clone(),
                silo_name: s.name.clone(),
                current_level_percent: s.current_level_percent,
                current_level_tons: s.current_level_tons,
                capacity_tons: s.capacity_tons.unwrap_or(0.0),
                total_production,
                total_packaging,
                net_change: total_production - total_packaging,
            }
        })
        .collect()
}

/// 人员报表: 按总吨位降序
pub fn aggregate_workers(records: &[PackagingRecord]) -> Vec<WorkerReportRow> {
    struct Acc {
        name: String,
        tons: f64,
        bags: i64,
        entries: usize,
        days: BTreeSet<NaiveDate>,
    }

    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for r in records {
        let acc = groups.entry(r.entry.worker_id.clone()).or_insert_with(|| Acc {
            name: r
                .worker_name
                .clone()
                .unwrap_or_else(|| r.entry.worker_id.clone()),
            tons: 0.0,
            bags: 0,
            entries: 0,
            days: BTreeSet::new(),
        });
        acc.tons += r.entry.quantity_tons;
        acc.bags += r.entry.quantity_bags.unwrap_or(0);
        acc.entries += 1;
        acc.days.insert(r.entry.recorded_at.date());
    }

    let mut rows: Vec<WorkerReportRow> = groups
        .into_iter()
        .map(|(worker_id, acc)| {
            let days_active = acc.days.len();
            WorkerReportRow {
                worker_id,
                worker_name: acc.name,
                total_quantity: acc.tons,
                total_bags: acc.bags,
                entry_count: acc.entries,
                days_active,
                avg_per_day: if days_active > 0 {
                    acc.tons / days_active as f64
                } else {
                    0.0
                },
            }
        })
        .collect();
    rows.sort_by(|a, b| b.total_quantity.total_cmp(&a.total_quantity));
    rows
}

/// 单个人员统计, 日均按自然日数计算
pub fn worker_stats(worker_id: &str, days: i64, entries: &[PackagingEntry]) -> WorkerPackagingStats {
    let mut by_type: BTreeMap<PackageType, f64> = BTreeMap::new();
    let mut total = 0.0;
    for e in entries {
        total += e.quantity_tons;
        *by_type.entry(e.package_type).or_default() += e.quantity_tons;
    }
    WorkerPackagingStats {
        worker_id: worker_id.to_string(),
        days,
        total_tons: total,
        total_entries: entries.len(),
        by_type,
        avg_per_day: if days > 0 { total / days as f64 } else { 0.0 },
    }
}

// ==========================================
// ReportEngine - 报表引擎
// ==========================================
pub struct ReportEngine {
    repos: LedgerRepositories,
}

impl ReportEngine {
    pub fn new(repos: LedgerRepositories) -> Self {
        Self { repos }
    }

    fn check_range(range: &DateRange) -> LedgerResult<()> {
        if !range.is_valid() {
            return Err(LedgerError::Validation(format!(
                "日期区间无效: {} > {}",
                range.start, range.end
            )));
        }
        Ok(())
    }

    pub fn production_report(&self, range: &DateRange) -> LedgerResult<Vec<ProductionReportRow>> {
        Self::check_range(range)?;
        let records = self.repos.report_repo.production_records(range)?;
        tracing::debug!(sessions = records.len(), "生产报表取数");
        Ok(aggregate_production(&records))
    }

    pub fn packaging_report(&self, range: &DateRange) -> LedgerResult<Vec<PackagingReportRow>> {
        Self::check_range(range)?;
        let records = self.repos.report_repo.packaging_records(range)?;
        tracing::debug!(entries = records.len(), "包装报表取数");
        Ok(aggregate_packaging(&records))
    }

    pub fn silo_report(&self, range: &DateRange) -> LedgerResult<Vec<SiloReportRow>> {
        Self::check_range(range)?;
        let silos = self.repos.silo_repo.list(None, true)?;
        let production = self.repos.report_repo.production_records(range)?;
        let packaging = self.repos.report_repo.packaging_records(range)?;
        Ok(aggregate_silos(&silos, &production, &packaging))
    }

    pub fn worker_report(&self, range: &DateRange) -> LedgerResult<Vec<WorkerReportRow>> {
        Self::check_range(range)?;
        let records = self.repos.report_repo.packaging_records(range)?;
        Ok(aggregate_workers(&records))
    }

    /// 某人员最近 days 天的包装统计
    pub fn worker_packaging_stats(
        &self,
        worker_id: &str,
        days: i64,
        now: NaiveDateTime,
    ) -> LedgerResult<WorkerPackagingStats> {
        if days <= 0 {
            return Err(LedgerError::Validation(format!("天数必须大于 0: {}", days)));
        }
        let since = days_before(now, days)
            .ok_or_else(|| LedgerError::Validation(format!("天数超出可查询范围: {}", days)))?;
        let entries = self
            .repos
            .packaging_repo
            .list_by_worker_since(worker_id, since)?;
        Ok(worker_stats(worker_id, days, &entries))
    }
}
