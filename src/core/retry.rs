//! 重试执行器
//!
//! 对一个可失败的异步操作最多调用 A 次。操作以带标签的 [`StepOutcome`] 报告结果：
//! - `Ok(payload)`：成功，立即返回；
//! - `SoftFail`：软失败，仍有次数则随机暂停后重试，次数耗尽返回 [`RetryOutcome::Exhausted`]（不报错）；
//! - `HardFail(err)`：硬失败，同样暂停重试，但最后一次失败时把错误抛给调用方。
//!
//! 软失败静默耗尽、硬失败响亮耗尽，这一不对称是错误分层的基础。

use std::fmt::Display;
use std::future::Future;

use crate::config::{PauseRange, SettingsSection};

/// 被包装操作单次调用的结果
#[derive(Debug)]
pub enum StepOutcome<T, E> {
    Ok(T),
    SoftFail,
    HardFail(E),
}

impl<E> StepOutcome<(), E> {
    /// 布尔约定：`true` 为成功，`false` 为软失败
    pub fn from_flag(ok: bool) -> Self {
        if ok {
            StepOutcome::Ok(())
        } else {
            StepOutcome::SoftFail
        }
    }
}

impl<T, E> StepOutcome<T, E> {
    /// 元组约定：首元素为 `true` 时成功并携带载荷，否则软失败
    pub fn from_tuple((ok, payload): (bool, T)) -> Self {
        if ok {
            StepOutcome::Ok(payload)
        } else {
            StepOutcome::SoftFail
        }
    }

    /// 缺省结果（如 `None`）视为软失败
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => StepOutcome::Ok(v),
            None => StepOutcome::SoftFail,
        }
    }
}

/// 重试执行器的最终结果（硬失败以 `Err` 返回）
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

/// 重试执行器：尝试次数 + 尝试间随机暂停
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    attempts: u32,
    pause: PauseRange,
}

impl RetryExecutor {
    pub fn new(attempts: u32, pause: PauseRange) -> Self {
        Self {
            attempts: attempts.max(1),
            pause,
        }
    }

    pub fn from_settings(settings: &SettingsSection) -> Self {
        Self::new(settings.attempts, settings.pause_between_attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// 执行 `op`，参数为从 1 开始的尝试序号
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = StepOutcome<T, E>>,
        E: Display,
    {
        for attempt in 1..=self.attempts {
            let last = attempt == self.attempts;
            match op(attempt).await {
                StepOutcome::Ok(value) => {
                    return Ok(RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    })
                }
                StepOutcome::SoftFail => {
                    if last {
                        break;
                    }
                    let pause = self.pause.sample();
                    tracing::info!(
                        "[{attempt}/{}] {label} did not succeed, sleeping for {} seconds before retry...",
                        self.attempts,
                        pause.as_secs()
                    );
                    tokio::time::sleep(pause).await;
                }
                StepOutcome::HardFail(err) => {
                    if last {
                        return Err(err);
                    }
                    let pause = self.pause.sample();
                    tracing::warn!(
                        "{label} attempt {attempt} failed: {err}, retrying after {}s",
                        pause.as_secs()
                    );
                    tokio::time::sleep(pause).await;
                }
            }
        }

        Ok(RetryOutcome::Exhausted {
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_nth_attempt() {
        let executor = RetryExecutor::new(5, PauseRange(1, 3));
        let calls = AtomicU32::new(0);

        let outcome = executor
            .run("op", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { StepOutcome::<(), String>::from_flag(n == 3) }
            })
            .await
            .unwrap();

        assert_eq!(outcome, RetryOutcome::Succeeded { value: (), attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tuple_and_flag_shapes_are_equivalent() {
        let executor = RetryExecutor::new(2, PauseRange::ZERO);

        let a = executor
            .run("flag", |_| async { StepOutcome::<(), String>::from_flag(true) })
            .await
            .unwrap();
        let b = executor
            .run("tuple", |_| async {
                StepOutcome::<&str, String>::from_tuple((true, "payload"))
            })
            .await
            .unwrap();

        assert!(a.is_success());
        assert_eq!(b.into_value(), Some("payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_failure_exhausts_silently() {
        let executor = RetryExecutor::new(4, PauseRange(1, 1));
        let calls = AtomicU32::new(0);

        let outcome = executor
            .run("op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { StepOutcome::<(), String>::from_tuple((false, ())) }
            })
            .await;

        assert_eq!(outcome.unwrap(), RetryOutcome::Exhausted { attempts: 4 });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_failure_raises_on_last_attempt() {
        let executor = RetryExecutor::new(3, PauseRange(10, 10));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = executor
            .run("op", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { StepOutcome::<(), String>::HardFail(format!("boom #{attempt}")) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "boom #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 两次暂停（A-1），最后一次失败不再暂停
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_then_success_recovers() {
        let executor = RetryExecutor::new(3, PauseRange::ZERO);
        let outcome = executor
            .run("op", |attempt| async move {
                if attempt == 1 {
                    StepOutcome::HardFail("transient".to_string())
                } else {
                    StepOutcome::Ok(attempt)
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome, RetryOutcome::Succeeded { value: 2, attempts: 2 });
    }

    #[tokio::test]
    async fn test_absent_result_counts_as_soft_failure() {
        let executor = RetryExecutor::new(1, PauseRange::ZERO);
        let outcome = executor
            .run("op", |_| async { StepOutcome::<u8, String>::from_option(None) })
            .await
            .unwrap();
        assert_eq!(outcome, RetryOutcome::Exhausted { attempts: 1 });
    }
}
