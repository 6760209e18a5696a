// ==========================================
// 磨粉厂筒仓台账系统 - 事务管理
// ==========================================
// 红线: 多步写入 (台账追加 + 筒仓更新 + 单据写入) 必须在同一事务内
// 说明: 使用 BEGIN IMMEDIATE, 同一数据库文件上的写事务串行执行
// 约束: 闭包内只能调用 *_tx 关联函数, 不能再调用持锁的仓储方法
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct TransactionManager {
    conn: Arc<Mutex<Connection>>,
}

impl TransactionManager {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在 IMMEDIATE 事务中执行闭包
    ///
    /// 闭包返回 Err 时事务回滚 (Transaction drop 时自动 rollback),
    /// 返回 Ok 时提交。
    pub fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        let conn = self.get_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(value)
    }
}
