// ==========================================
// 磨粉厂筒仓台账系统 - 变更通知
// ==========================================
// 职责: 定义变更事件发布 trait, 提供进程内广播实现
// 说明: 事件只表示“某表有变化, 请重新查询”, 不携带可直接应用的增量
// 红线: 只在事务提交之后发布
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

// ==========================================
// 变更事件
// ==========================================

/// 发生变更的表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Silos,
    SiloLevelLogs,
    ProductionSessions,
    PackagingEntries,
    Mills,
    FlowNodes,
    FlowConnections,
    Users,
}

impl ChangeTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTable::Silos => "silos",
            ChangeTable::SiloLevelLogs => "silo_level_logs",
            ChangeTable::ProductionSessions => "production_sessions",
            ChangeTable::PackagingEntries => "packaging_entries",
            ChangeTable::Mills => "mills",
            ChangeTable::FlowNodes => "flow_nodes",
            ChangeTable::FlowConnections => "flow_connections",
            ChangeTable::Users => "users",
        }
    }
}

impl fmt::Display for ChangeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// 变更事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub row_id: String,
    pub occurred_at: NaiveDateTime,
}

impl ChangeEvent {
    pub fn new(table: ChangeTable, kind: ChangeKind, row_id: &str, occurred_at: NaiveDateTime) -> Self {
        Self {
            table,
            kind,
            row_id: row_id.to_string(),
            occurred_at,
        }
    }

    pub fn insert(table: ChangeTable, row_id: &str, at: NaiveDateTime) -> Self {
        Self::new(table, ChangeKind::Insert, row_id, at)
    }

    pub fn update(table: ChangeTable, row_id: &str, at: NaiveDateTime) -> Self {
        Self::new(table, ChangeKind::Update, row_id, at)
    }

    pub fn delete(table: ChangeTable, row_id: &str, at: NaiveDateTime) -> Self {
        Self::new(table, ChangeKind::Delete, row_id, at)
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 变更事件发布者 Trait
///
/// Engine 层只依赖此 trait; 进程内广播见 `ChangeFeed`。
pub trait ChangeEventPublisher: Send + Sync {
    /// 发布变更事件
    ///
    /// # 返回
    /// - `Ok(n)`: 收到事件的订阅者数量
    fn publish(&self, event: ChangeEvent) -> Result<usize, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl ChangeEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: ChangeEvent) -> Result<usize, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - table={}, row_id={}",
            event.table,
            event.row_id
        );
        Ok(0)
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn ChangeEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn ChangeEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn ChangeEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    ///
    /// 发布失败只记录日志: 数据已提交, 订阅方可自行重新查询。
    pub fn publish(&self, event: ChangeEvent) {
        match &self.inner {
            Some(publisher) => {
                if let Err(e) = publisher.publish(event.clone()) {
                    tracing::warn!(
                        table = %event.table,
                        row_id = %event.row_id,
                        error = %e,
                        "变更事件发布失败"
                    );
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - table={}, row_id={}",
                    event.table,
                    event.row_id
                );
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

// ==========================================
// ChangeFeed - 进程内广播
// ==========================================

/// 默认缓冲容量
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// 订阅端错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeFeedError {
    /// 订阅端处理过慢, 丢失了 n 条事件; 应全量重新查询
    #[error("变更通知积压, 丢失 {0} 条事件")]
    Lagged(u64),

    #[error("变更通知已关闭")]
    Closed,
}

/// 变更通知中心
///
/// 基于 tokio::sync::broadcast:
/// - 发布不阻塞, 慢订阅者不影响写入
/// - 无订阅者时事件直接丢弃
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    capacity: usize,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// 订阅指定表的变更 (空集合表示全部表)
    pub fn subscribe(&self, tables: &[ChangeTable]) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            tables: tables.iter().copied().collect(),
        }
    }

    /// 发布事件, 无订阅者时忽略
    pub fn emit_lossy(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeEventPublisher for ChangeFeed {
    fn publish(&self, event: ChangeEvent) -> Result<usize, Box<dyn Error + Send + Sync>> {
        Ok(self.emit_lossy(event))
    }
}

/// 按表过滤的订阅
pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    tables: HashSet<ChangeTable>,
}

impl ChangeSubscription {
    fn wants(&self, table: ChangeTable) -> bool {
        self.tables.is_empty() || self.tables.contains(&table)
    }

    /// 等待下一条订阅表上的事件
    pub async fn recv(&mut self) -> Result<ChangeEvent, ChangeFeedError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(event.table) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "变更订阅积压");
                    return Err(ChangeFeedError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ChangeFeedError::Closed),
            }
        }
    }

    /// 非阻塞读取
    ///
    /// # 返回
    /// - Ok(None): 暂无事件
    /// - Err(Lagged(n)): 丢失了 n 条事件, 应全量重新查询
    pub fn try_recv(&mut self) -> Result<Option<ChangeEvent>, ChangeFeedError> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(event.table) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "变更订阅积压");
                    return Err(ChangeFeedError::Lagged(n));
                }
                Err(broadcast::error::TryRecvError::Closed) => return Err(ChangeFeedError::Closed),
            }
        }
    }
}
