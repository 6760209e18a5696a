// ==========================================
// 磨粉厂筒仓台账系统 - 主数据
// ==========================================
// 磨机 / 分级机 / 产品 / 人员
// ==========================================

use crate::domain::silo::Silo;
use crate::domain::types::UserRole;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Mill - 磨机
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mill {
    pub id: String,
    pub code: String,
    pub name: String,
    pub mill_type: String,
    pub feed_source: Option<String>,
    pub separator_count: i64,
    pub default_hourly_rate: Option<f64>,
    pub sends_to_coating: bool,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// 新建磨机请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMill {
    pub code: String,
    pub name: String,
    pub mill_type: String,
    pub feed_source: Option<String>,
    pub separator_count: i64,
    pub default_hourly_rate: Option<f64>,
    pub sends_to_coating: bool,
    pub notes: Option<String>,
}

/// 磨机可更新字段 (None 表示不修改)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MillUpdate {
    pub name: Option<String>,
    pub mill_type: Option<String>,
    pub feed_source: Option<String>,
    pub separator_count: Option<i64>,
    pub default_hourly_rate: Option<f64>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
    pub sends_to_coating: Option<bool>,
}

impl MillUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.mill_type.is_none()
            && self.feed_source.is_none()
            && self.separator_count.is_none()
            && self.default_hourly_rate.is_none()
            && self.notes.is_none()
            && self.is_active.is_none()
            && self.sends_to_coating.is_none()
    }
}

// 分级机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Separator {
    pub id: String,
    pub mill_id: String,
    pub number: i64,
    pub name: Option<String>,
    pub default_product: Option<String>,
    pub default_micron: Option<f64>,
    pub is_active: bool,
}

/// 磨机详情 (含分级机与所属筒仓)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MillDetail {
    pub mill: Mill,
    pub separators: Vec<Separator>,
    pub silos: Vec<Silo>,
}

// ==========================================
// Product - 产品
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub code: String,
    pub name: String,
    pub micron: Option<f64>,
    pub variant: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

// ==========================================
// User - 人员
// ==========================================
// 仅作为 created_by / recorded_by / worker_id 的引用对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// 人员可更新字段 (None 表示不修改)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.role.is_none()
            && self.phone.is_none()
            && self.is_active.is_none()
    }
}

/// 人员统计 (by_role 含停用人员)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_role: BTreeMap<UserRole, usize>,
}

impl UserStats {
    pub fn from_users(users: &[User]) -> Self {
        let mut stats = UserStats {
            total: users.len(),
            ..Default::default()
        };
        for user in users {
            if user.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            *stats.by_role.entry(user.role).or_default() += 1;
        }
        stats
    }
}

/// 筒仓允许存放的产品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloProductRule {
    pub id: String,
    pub silo_id: String,
    pub product_id: String,
    pub created_at: NaiveDateTime,
}
