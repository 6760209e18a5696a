// ==========================================
// 磨粉厂筒仓台账系统 - 配置管理 API
// ==========================================
// 职责: 配置查询、更新、快照管理
// 约束: 已知配置键写入前做类型校验
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{require_non_empty, ApiError, ApiResult};
use crate::config::config_manager::{config_keys, ConfigManager, StockCheckMode};

// ==========================================
// ConfigApi - 配置管理 API
// ==========================================

/// 配置管理API
///
/// 职责：
/// 1. 配置查询（全部、单个）
/// 2. 配置更新（单个、批量）
/// 3. 配置快照管理
pub struct ConfigApi {
    config_manager: Arc<ConfigManager>,
}

impl ConfigApi {
    pub fn new(config_manager: Arc<ConfigManager>) -> Self {
        Self { config_manager }
    }

    /// 查询所有 global 配置
    pub fn list_configs(&self) -> ApiResult<Vec<ConfigItem>> {
        let configs = self
            .config_manager
            .list_global_configs()
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Ok(configs
            .into_iter()
            .map(|(key, value)| ConfigItem { key, value })
            .collect())
    }

    /// 查询单个配置
    ///
    /// # 返回
    /// - Ok(None): 未设置 (引擎使用默认值)
    pub fn get_config(&self, key: &str) -> ApiResult<Option<ConfigItem>> {
        require_non_empty("配置键", key)?;
        let value = self
            .config_manager
            .get_global_config_value(key)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Ok(value.map(|value| ConfigItem {
            key: key.to_string(),
            value,
        }))
    }

    /// 更新配置
    ///
    /// # 参数
    /// - operator: 操作人 (记入日志)
    pub fn update_config(&self, key: &str, value: &str, operator: &str) -> ApiResult<()> {
        require_non_empty("配置键", key)?;
        require_non_empty("操作人", operator)?;
        validate_config_value(key, value)?;

        self.config_manager
            .set_global_config_value(key, value.trim())
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        tracing::info!(key, value, operator, "更新配置");
        Ok(())
    }

    /// 批量更新配置 (先全部校验, 再逐条写入)
    pub fn batch_update_configs(&self, configs: Vec<ConfigItem>, operator: &str) -> ApiResult<usize> {
        if configs.is_empty() {
            return Err(ApiError::InvalidInput("配置列表不能为空".to_string()));
        }
        require_non_empty("操作人", operator)?;
        for item in &configs {
            require_non_empty("配置键", &item.key)?;
            validate_config_value(&item.key, &item.value)?;
        }

        let snapshot = serde_json::to_string(
            &configs
                .iter()
                .map(|c| (c.key.clone(), c.value.trim().to_string()))
                .collect::<std::collections::BTreeMap<_, _>>(),
        )
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
        let count = self
            .config_manager
            .restore_config_from_snapshot(&snapshot)
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        tracing::info!(count, operator, "批量更新配置");
        Ok(count)
    }

    /// 获取配置快照 (JSON)
    pub fn get_config_snapshot(&self) -> ApiResult<String> {
        self.config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::InternalError(e.to_string()))
    }

    /// 从快照恢复配置
    pub fn restore_from_snapshot(&self, snapshot_json: &str, operator: &str) -> ApiResult<usize> {
        require_non_empty("快照JSON", snapshot_json)?;
        require_non_empty("操作人", operator)?;

        let count = self
            .config_manager
            .restore_config_from_snapshot(snapshot_json)
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

        tracing::info!(count, operator, "从快照恢复配置");
        Ok(count)
    }
}

/// 已知配置键的取值校验
fn validate_config_value(key: &str, value: &str) -> ApiResult<()> {
    let value = value.trim();
    let invalid = |expect: &str| -> ApiResult<()> {
        Err(ApiError::ValidationError(format!(
            "配置 {} 的取值 {} 无效, 应为{}",
            key, value, expect
        )))
    };

    match key {
        config_keys::LEVEL_BAND_MEDIUM_PCT
        | config_keys::LEVEL_BAND_HIGH_PCT
        | config_keys::LEVEL_BAND_CRITICAL_PCT => match value.parse::<f64>() {
            Ok(v) if (0.0..=100.0).contains(&v) => Ok(()),
            _ => invalid(" 0-100 之间的数字"),
        },
        config_keys::ENFORCE_PRODUCT_RULES | config_keys::AUTO_RECONCILE_ON_COMPLETE => {
            match value.parse::<bool>() {
                Ok(_) => Ok(()),
                Err(_) => invalid(" true/false"),
            }
        }
        config_keys::STOCK_CHECK_MODE => match value.parse::<StockCheckMode>() {
            Ok(_) => Ok(()),
            Err(_) => invalid(" STRICT 或 AUTO_FIX"),
        },
        config_keys::LEVEL_LOG_LIMIT
        | config_keys::LEVEL_HISTORY_DAYS
        | config_keys::PACKAGING_LIST_LIMIT
        | config_keys::SESSION_LIST_LIMIT => match value.parse::<i64>() {
            Ok(v) if v > 0 => Ok(()),
            _ => invalid("正整数"),
        },
        _ => Ok(()),
    }
}

// ==========================================
// DTO 类型定义
// ==========================================

/// 配置项 (global 作用域)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
}
