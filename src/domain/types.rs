// ==========================================
// 磨粉厂筒仓台账系统 - 领域类型定义
// ==========================================
// 存储格式: 与数据库 CHECK 约束中的取值一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 数据库中出现了无法识别的枚举值
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知的{kind}取值: {value}")]
pub struct UnknownEnumValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownEnumValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ==========================================
// 筒仓类型 (Silo Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiloType {
    MillProduct,    // 磨机成品仓
    CoatingRaw,     // 改性原料仓
    CoatingProduct, // 改性成品仓
}

impl SiloType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiloType::MillProduct => "mill_product",
            SiloType::CoatingRaw => "coating_raw",
            SiloType::CoatingProduct => "coating_product",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownEnumValue> {
        match s {
            "mill_product" => Ok(SiloType::MillProduct),
            "coating_raw" => Ok(SiloType::CoatingRaw),
            "coating_product" => Ok(SiloType::CoatingProduct),
            other => Err(UnknownEnumValue::new("筒仓类型", other)),
        }
    }
}

impl fmt::Display for SiloType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 包装类型 (Package Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageType {
    Bb,    // 吨袋 (Big Bag)
    Pp,    // PP 编织袋
    Kraft, // 牛皮纸袋
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Bb => "BB",
            PackageType::Pp => "PP",
            PackageType::Kraft => "KRAFT",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownEnumValue> {
        match s {
            "BB" => Ok(PackageType::Bb),
            "PP" => Ok(PackageType::Pp),
            "KRAFT" => Ok(PackageType::Kraft),
            other => Err(UnknownEnumValue::new("包装类型", other)),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 生产状态 (Production Status)
// ==========================================
// 状态机: active ⇄ paused, {active, paused} -> {completed, cancelled}
// completed / cancelled 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Active,    // 生产中
    Paused,    // 暂停
    Completed, // 已完成
    Cancelled, // 已取消
}

impl ProductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStatus::Active => "active",
            ProductionStatus::Paused => "paused",
            ProductionStatus::Completed => "completed",
            ProductionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownEnumValue> {
        match s {
            "active" => Ok(ProductionStatus::Active),
            "paused" => Ok(ProductionStatus::Paused),
            "completed" => Ok(ProductionStatus::Completed),
            "cancelled" => Ok(ProductionStatus::Cancelled),
            other => Err(UnknownEnumValue::new("生产状态", other)),
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProductionStatus::Completed | ProductionStatus::Cancelled)
    }

    /// 状态转换是否合法
    pub fn can_transition_to(&self, next: ProductionStatus) -> bool {
        use ProductionStatus::*;
        matches!(
            (self, next),
            (Active, Paused)
                | (Paused, Active)
                | (Active, Completed)
                | (Active, Cancelled)
                | (Paused, Completed)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 料位来源 (Level Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSource {
    Manual,     // 人工录入
    Calculated, // 由业务单据推算
    Sensor,     // 仪表上报
}

impl LevelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelSource::Manual => "manual",
            LevelSource::Calculated => "calculated",
            LevelSource::Sensor => "sensor",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownEnumValue> {
        match s {
            "manual" => Ok(LevelSource::Manual),
            "calculated" => Ok(LevelSource::Calculated),
            "sensor" => Ok(LevelSource::Sensor),
            other => Err(UnknownEnumValue::new("料位来源", other)),
        }
    }
}

impl fmt::Display for LevelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 用户角色 (User Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Operator,
    Worker,
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Operator => "operator",
            UserRole::Worker => "worker",
            UserRole::Viewer => "viewer",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownEnumValue> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "operator" => Ok(UserRole::Operator),
            "worker" => Ok(UserRole::Worker),
            "viewer" => Ok(UserRole::Viewer),
            other => Err(UnknownEnumValue::new("用户角色", other)),
        }
    }
}

// ==========================================
// 流程图实体类型 (Flow Entity Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEntityType {
    Mill,
    Silo,
    Coating,
    Output,
}

impl FlowEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowEntityType::Mill => "mill",
            FlowEntityType::Silo => "silo",
            FlowEntityType::Coating => "coating",
            FlowEntityType::Output => "output",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownEnumValue> {
        match s {
            "mill" => Ok(FlowEntityType::Mill),
            "silo" => Ok(FlowEntityType::Silo),
            "coating" => Ok(FlowEntityType::Coating),
            "output" => Ok(FlowEntityType::Output),
            other => Err(UnknownEnumValue::new("流程实体类型", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_status_transitions() {
        use ProductionStatus::*;

        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Cancelled));

        // 终态不可再转换
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Active, Paused, Completed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }

        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_db_str_mapping() {
        assert_eq!(PackageType::from_db_str("KRAFT").unwrap(), PackageType::Kraft);
        assert_eq!(SiloType::from_db_str("coating_raw").unwrap().as_str(), "coating_raw");
        assert_eq!(LevelSource::from_db_str("sensor").unwrap(), LevelSource::Sensor);

        let err = PackageType::from_db_str("bb").unwrap_err();
        assert_eq!(err.value, "bb");
    }

    #[test]
    fn test_serde_matches_db_str() {
        let json = serde_json::to_string(&PackageType::Bb).unwrap();
        assert_eq!(json, "\"BB\"");
        let json = serde_json::to_string(&SiloType::CoatingProduct).unwrap();
        assert_eq!(json, "\"coating_product\"");
    }
}
