//! 有界、满时丢弃最旧元素的队列。
//!
//! 生产者永不阻塞：采集侧推入读数时不会被慢消费者拖住。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

pub struct DropOldestQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    pushed: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// 推入元素；队列满时丢弃最旧的一个，返回是否发生丢弃。关闭后推入直接丢弃。
    pub fn push(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front().is_some()
            } else {
                false
            };
            items.push_back(item);
            evicted
        };
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// 取出最旧元素；队列为空时等待。关闭且取空后返回 `None`。
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// 最多取出 `max` 个已就绪元素，不等待。
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut items = self.lock();
        let count = max.min(items.len());
        items.drain(..count).collect()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// 关闭队列并唤醒所有等待者；已有元素仍可取出。
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // 临界区内不会 panic，锁中毒时沿用内部数据
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
