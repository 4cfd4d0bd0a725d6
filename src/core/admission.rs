//! 准入闸门：全局计数信号量
//!
//! 所有 Worker Loop 共享同一个闸门，容量 K 即同时处于 Running 的会话上限。
//! tokio 的 Semaphore 按 FIFO 唤醒等待者，公平但不区分优先级。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::core::RunnerError;

/// 准入许可；Drop 即释放槽位（任何退出路径都会归还）
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// 准入闸门
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前被占用的槽位数
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// 等待一个空闲槽位
    pub async fn acquire(&self) -> Result<AdmissionPermit, RunnerError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RunnerError::GateClosed)?;
        Ok(AdmissionPermit { _permit: permit })
    }
}
