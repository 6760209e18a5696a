// ==========================================
// 磨粉厂筒仓台账系统 - 引擎层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("{entity}不存在: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("库存不足: silo_id={silo_id}, 需要 {requested} 吨, 当前 {available} 吨")]
    InsufficientStock {
        silo_id: String,
        requested: f64,
        available: f64,
    },

    #[error("业务规则违反: {0}")]
    BusinessRule(String),

    #[error("配置读取失败: {0}")]
    Config(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
