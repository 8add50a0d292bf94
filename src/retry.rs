// ==========================================
// 贷款数据带导入系统 - 外部调用重试
// ==========================================
// 适用: AI 推断 / 邮箱 API 等瞬时失败的外部调用
// 红线: 行级落库失败不走重试;非瞬时错误（缺配置、响应无效、消息不存在）只尝试一次
// ==========================================

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 错误是否值得重试
pub trait TransientError: std::fmt::Display {
    fn is_transient(&self) -> bool;
}

/// 有界重试策略（线性退避）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// 仅尝试一次
    pub fn none() -> Self {
        Self::new(1, 0)
    }

    /// 执行 op,瞬时失败时按 attempt * backoff 等待后重试
    ///
    /// 非瞬时错误立即返回;耗尽次数后返回最后一次的错误。
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: TransientError,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "外部调用失败,准备重试"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    if !err.is_transient() {
                        warn!(operation, attempt, error = %err, "外部调用失败,错误不可重试");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum FakeError {
        Flaky(String),
        Fatal,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                FakeError::Flaky(msg) => write!(f, "flaky: {}", msg),
                FakeError::Fatal => write!(f, "fatal"),
            }
        }
    }

    impl TransientError for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, FakeError::Flaky(_))
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 0);

        let result: Result<&str, FakeError> = policy
            .run("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(FakeError::Flaky(format!("attempt {} failed", n)))
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, 0);

        let result: Result<(), FakeError> = policy
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Flaky("unavailable".to_string()))
            })
            .await;

        assert_eq!(result, Err(FakeError::Flaky("unavailable".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, 0);

        let result: Result<(), FakeError> = policy
            .run("misconfigured", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Fatal)
            })
            .await;

        assert_eq!(result, Err(FakeError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_retry_midway() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, 0);

        let result: Result<(), FakeError> = policy
            .run("degrading", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    Err(FakeError::Flaky("timeout".to_string()))
                } else {
                    Err(FakeError::Fatal)
                }
            })
            .await;

        assert_eq!(result, Err(FakeError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
