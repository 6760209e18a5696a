// ==========================================
// 磨粉厂筒仓台账系统 - 报表模型
// ==========================================
// 报表均按闭区间 [start, end] 统计
// ==========================================

use crate::domain::types::PackageType;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// DateRange - 统计区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// 快捷区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Today,
    Week, // 周一开始
    Month,
    Custom {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    // 存储精度为秒
    date.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1)
}

fn first_day_of_next_month(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(date)
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// 由快捷区间计算统计区间
    pub fn for_period(period: ReportPeriod, now: NaiveDateTime) -> Self {
        let today = now.date();
        match period {
            ReportPeriod::Today => Self::new(start_of_day(today), end_of_day(today)),
            ReportPeriod::Week => {
                let monday =
                    today - Duration::days(today.weekday().num_days_from_monday() as i64);
                Self::new(start_of_day(monday), end_of_day(monday + Duration::days(6)))
            }
            ReportPeriod::Month => {
                let first = today.with_day(1).unwrap_or(today);
                let last = first_day_of_next_month(first) - Duration::days(1);
                Self::new(start_of_day(first), end_of_day(last))
            }
            ReportPeriod::Custom { start, end } => Self::new(
                start.unwrap_or_else(|| start_of_day(today)),
                end.unwrap_or_else(|| end_of_day(today)),
            ),
        }
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// now 往前推 days 天
///
/// 超出 chrono 可表示的日期范围时返回 None
pub fn days_before(now: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    Duration::try_days(days).and_then(|d| now.checked_sub_signed(d))
}

// ==========================================
// 报表行
// ==========================================

/// 生产报表: 按 (磨机, 产品) 汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionReportRow {
    pub mill_id: String,
    pub mill_code: String,
    pub mill_name: String,
    pub product_id: String,
    pub product_code: String,
    pub product_name: String,
    pub total_quantity: f64,
    pub total_duration_hours: f64,
    pub session_count: usize,
    pub avg_hourly_rate: f64,
}

/// 包装报表: 按 (筒仓, 产品, 包装类型) 汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingReportRow {
    pub silo_id: String,
    pub silo_code: String,
    pub silo_name: String,
    pub product_id: String,
    pub product_code: String,
    pub product_name: String,
    pub package_type: PackageType,
    pub total_quantity: f64,
    pub total_bags: i64,
    pub entry_count: usize,
}

/// 筒仓报表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloReportRow {
    pub silo_id: String,
    pub silo_code: String,
    pub silo_name: String,
    pub current_level_percent: f64,
    pub current_level_tons: f64,
    pub capacity_tons: f64, // 未知时为 0
    pub total_production: f64,
    pub total_packaging: f64,
    pub net_change: f64,
}

/// 人员报表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReportRow {
    pub worker_id: String,
    pub worker_name: String,
    pub total_quantity: f64,
    pub total_bags: i64,
    pub entry_count: usize,
    pub days_active: usize,
    pub avg_per_day: f64,
}

/// 单个人员的包装统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPackagingStats {
    pub worker_id: String,
    pub days: i64,
    pub total_tons: f64,
    pub total_entries: usize,
    pub by_type: BTreeMap<PackageType, f64>,
    pub avg_per_day: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_for_period_today() {
        let r = DateRange::for_period(ReportPeriod::Today, at(2026, 3, 18, 14));
        assert_eq!(r.start, at(2026, 3, 18, 0));
        assert_eq!(r.end, at(2026, 3, 18, 23) + Duration::seconds(59 * 60 + 59));
    }

    #[test]
    fn test_for_period_week_starts_monday() {
        // 2026-03-18 为周三
        let r = DateRange::for_period(ReportPeriod::Week, at(2026, 3, 18, 14));
        assert_eq!(r.start, at(2026, 3, 16, 0));
        assert_eq!(r.end.date(), NaiveDate::from_ymd_opt(2026, 3, 22).unwrap());

        // 周日仍属于本周
        let r = DateRange::for_period(ReportPeriod::Week, at(2026, 3, 22, 9));
        assert_eq!(r.start, at(2026, 3, 16, 0));
    }

    #[test]
    fn test_for_period_month() {
        let r = DateRange::for_period(ReportPeriod::Month, at(2026, 12, 5, 1));
        assert_eq!(r.start, at(2026, 12, 1, 0));
        assert_eq!(r.end.date(), NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());

        let r = DateRange::for_period(ReportPeriod::Month, at(2028, 2, 10, 1));
        assert_eq!(r.end.date(), NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
    }

    #[test]
    fn test_for_period_custom_defaults() {
        let now = at(2026, 3, 18, 14);
        let r = DateRange::for_period(
            ReportPeriod::Custom {
                start: Some(at(2026, 3, 1, 0)),
                end: None,
            },
            now,
        );
        assert_eq!(r.start, at(2026, 3, 1, 0));
        assert_eq!(r.end.date(), now.date());
        assert!(r.contains(&now));
        assert!(r.is_valid());
    }

    #[test]
    fn test_days_before_out_of_range() {
        let now = at(2026, 3, 18, 14);
        assert_eq!(days_before(now, 7), Some(at(2026, 3, 11, 14)));
        assert_eq!(days_before(now, 1_000_000_000), None);
        assert_eq!(days_before(now, i64::MAX), None);
    }
}
