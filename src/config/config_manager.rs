// ==========================================
// 磨粉厂筒仓台账系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope, 目前仅 global)
// ==========================================

use crate::domain::capacity::LevelBandThresholds;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// StockCheckMode - 包装出库库存校验模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockCheckMode {
    /// 严格模式：库存不足直接拒绝
    Strict,
    /// 自动修复模式：告警并把料位截到 0
    AutoFix,
}

impl StockCheckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockCheckMode::Strict => "STRICT",
            StockCheckMode::AutoFix => "AUTO_FIX",
        }
    }
}

impl FromStr for StockCheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRICT" => Ok(StockCheckMode::Strict),
            "AUTO_FIX" | "AUTOFIX" => Ok(StockCheckMode::AutoFix),
            other => Err(format!("未知的库存校验模式: {}", other)),
        }
    }
}

impl fmt::Display for StockCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 列出全部 global 配置 (按 key 排序)
    pub fn list_global_configs(&self) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 解析数值配置; 格式错误时告警并回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + Copy + fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let config_map = self.list_global_configs()?;
        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖同名的 global 配置, 快照中不存在的键保持不变
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            let affected = tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            count += affected;
        }

        tx.commit()?;
        Ok(count)
    }

    // ===== 筒仓 =====

    /// 料位分档阈值
    ///
    /// 阈值不递增时回退默认值 40/60/80。
    pub fn get_level_band_thresholds(&self) -> Result<LevelBandThresholds, Box<dyn Error>> {
        let defaults = LevelBandThresholds::default();
        let thresholds = LevelBandThresholds {
            medium_pct: self.get_parsed_or_default(config_keys::LEVEL_BAND_MEDIUM_PCT, defaults.medium_pct)?,
            high_pct: self.get_parsed_or_default(config_keys::LEVEL_BAND_HIGH_PCT, defaults.high_pct)?,
            critical_pct: self
                .get_parsed_or_default(config_keys::LEVEL_BAND_CRITICAL_PCT, defaults.critical_pct)?,
        };
        if !thresholds.is_valid() {
            tracing::warn!(?thresholds, "料位分档阈值不递增，使用默认值");
            return Ok(defaults);
        }
        Ok(thresholds)
    }

    /// 是否强制校验筒仓产品规则
    pub fn get_enforce_product_rules(&self) -> Result<bool, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::ENFORCE_PRODUCT_RULES, false)
    }

    // ===== 包装 =====

    pub fn get_stock_check_mode(&self) -> Result<StockCheckMode, Box<dyn Error>> {
        let raw = self.get_config_or_default(config_keys::STOCK_CHECK_MODE, "STRICT")?;
        match raw.parse::<StockCheckMode>() {
            Ok(mode) => Ok(mode),
            Err(e) => {
                tracing::warn!(config_key = config_keys::STOCK_CHECK_MODE, error = %e, "使用默认值 STRICT");
                Ok(StockCheckMode::Strict)
            }
        }
    }

    // ===== 生产 =====

    /// 完成生产时是否自动入库对账
    pub fn get_auto_reconcile_on_complete(&self) -> Result<bool, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::AUTO_RECONCILE_ON_COMPLETE, false)
    }

    // ===== 查询 =====

    pub fn get_level_log_limit(&self) -> Result<usize, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::LEVEL_LOG_LIMIT, 100)
    }

    pub fn get_level_history_days(&self) -> Result<i64, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::LEVEL_HISTORY_DAYS, 7)
    }

    pub fn get_packaging_list_limit(&self) -> Result<usize, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::PACKAGING_LIST_LIMIT, 100)
    }

    pub fn get_session_list_limit(&self) -> Result<usize, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::SESSION_LIST_LIMIT, 100)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 料位分档
    pub const LEVEL_BAND_MEDIUM_PCT: &str = "silo.level_band_medium_pct";
    pub const LEVEL_BAND_HIGH_PCT: &str = "silo.level_band_high_pct";
    pub const LEVEL_BAND_CRITICAL_PCT: &str = "silo.level_band_critical_pct";

    // 产品规则
    pub const ENFORCE_PRODUCT_RULES: &str = "silo.enforce_product_rules";

    // 包装出库
    pub const STOCK_CHECK_MODE: &str = "packaging.stock_check_mode";

    // 生产入库
    pub const AUTO_RECONCILE_ON_COMPLETE: &str = "production.auto_reconcile_on_complete";

    // 查询默认值
    pub const LEVEL_LOG_LIMIT: &str = "query.level_log_limit";
    pub const LEVEL_HISTORY_DAYS: &str = "query.level_history_days";
    pub const PACKAGING_LIST_LIMIT: &str = "query.packaging_list_limit";
    pub const SESSION_LIST_LIMIT: &str = "query.session_list_limit";
}
