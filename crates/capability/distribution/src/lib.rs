//! # 读数分发
//!
//! ```text
//! ReadingQueue（采集侧入口）
//!       │  分发任务
//!       ├──▶ 缓存队列 ──▶ 缓存工作任务 ──▶ ReadingCache
//!       ├──▶ 持久化队列 ──▶ 持久化工作任务（批量 + 有界重试）──▶ ReadingSink
//!       └──▶ 订阅者队列 × N ──▶ 订阅者工作任务 ──▶ ReadingSubscriber
//! ```
//!
//! 每个队列满时丢弃最旧读数并计数，慢消费者只会丢自己的数据，不会拖住采集或其他消费者。

mod dispatcher;
mod queue;
mod subscriber;

pub use dispatcher::{
    DistributionConfig, DistributionHandle, DistributionStats, Distributor, DrainReport,
    SinkKind, SinkStats,
};
pub use queue::DropOldestQueue;
pub use subscriber::{PublishError, ReadingSubscriber};

use domain::Reading;
use std::sync::Arc;

/// 采集侧与分发侧之间的入口队列。
pub type ReadingQueue = DropOldestQueue<Arc<Reading>>;
