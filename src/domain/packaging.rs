// ==========================================
// 磨粉厂筒仓台账系统 - 包装出库领域模型
// ==========================================
// 红线: 包装记录一经创建不可修改
// 对齐: packaging_entries 表
// ==========================================

use crate::domain::level_log::SiloLevelLog;
use crate::domain::silo::SiloLevel;
use crate::domain::types::PackageType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// PackagingEntry - 包装记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingEntry {
    pub id: String,
    pub silo_id: String,
    pub product_id: String,
    pub worker_id: String,
    pub package_type: PackageType,
    pub quantity_tons: f64,
    pub quantity_bags: Option<i64>,
    pub shift: Option<String>,
    pub recorded_at: NaiveDateTime,
    pub created_by: String,
    pub notes: Option<String>,
}

/// 新建包装记录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePackagingRequest {
    pub silo_id: String,
    pub product_id: String,
    pub worker_id: String,
    pub package_type: PackageType,
    pub quantity_tons: f64,
    pub quantity_bags: Option<i64>,
    pub shift: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
}

/// 包装出库结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingOutcome {
    pub entry: PackagingEntry,
    pub silo_level_after: SiloLevel,
    pub ledger_entry: SiloLevelLog,
}

/// 包装记录查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagingFilter {
    pub silo_id: Option<String>,
    pub worker_id: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limit: Option<usize>,
}

/// 台账备注
pub fn packaging_ledger_note(quantity_tons: f64, package_type: PackageType) -> String {
    format!("包装出库: {} 吨 {}", quantity_tons, package_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packaging_ledger_note() {
        assert_eq!(packaging_ledger_note(3.0, PackageType::Bb), "包装出库: 3 吨 BB");
        assert_eq!(packaging_ledger_note(1.25, PackageType::Kraft), "包装出库: 1.25 吨 KRAFT");
    }
}
