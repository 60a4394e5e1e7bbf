//! Transient-failure retry for storage calls
//!
//! Deadlocks, serialization failures, busy SQLite files and dropped
//! connections are retried with exponential backoff plus jitter. Everything
//! else (constraint violations, missing rows) is returned immediately.

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;

/// MySQL 1213/1205, PostgreSQL 40001/40P01, SQLite BUSY(5)/LOCKED(6)
const RETRYABLE_SQL_CODES: &[&str] = &["1213", "1205", "40001", "40P01", "5", "6"];

const RETRYABLE_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "serialization failure",
];

/// 判断数据库错误是否可重试
pub fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime_err) | DbErr::Query(runtime_err) => {
            is_retryable_runtime_error(runtime_err)
        }
        _ => false,
    }
}

fn is_retryable_runtime_error(err: &sea_orm::error::RuntimeErr) -> bool {
    use sea_orm::error::RuntimeErr;

    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            if let Some(db_err) = sqlx_err.deref().as_database_error()
                && let Some(code) = db_err.code()
            {
                return RETRYABLE_SQL_CODES.contains(&code.as_ref());
            }
            message_is_retryable(&sqlx_err.to_string())
        }
        RuntimeErr::Internal(msg) => message_is_retryable(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn message_is_retryable(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    RETRYABLE_MESSAGES.iter().any(|m| lower.contains(m))
}

/// Backoff policy for storage operations
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// No retries at all (tests that want to observe the first failure)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), capped, plus 0-25% jitter
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        use rand::RngExt;
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay_ms);
        capped.saturating_add(rand::rng().random_range(0..=capped / 4))
    }

    /// Run `operation`, retrying while it fails with a retryable error
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, DbErr>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbErr>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("'{}' succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if is_retryable_error(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff_ms(attempt);
                    warn!(
                        "'{}' failed (attempt {}/{}): {}; retrying in {} ms",
                        operation_name,
                        attempt,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 5,
            max_delay_ms: 20,
        }
    }

    #[test]
    fn test_connection_errors_are_retryable() {
        let err = DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout);
        assert!(is_retryable_error(&err));
    }

    #[test]
    fn test_lock_messages_are_retryable() {
        for msg in ["database is locked", "Deadlock found when trying to get lock"] {
            let err = DbErr::Exec(sea_orm::error::RuntimeErr::Internal(msg.to_string()));
            assert!(is_retryable_error(&err), "{msg}");
        }
    }

    #[test]
    fn test_missing_record_is_not_retryable() {
        assert!(!is_retryable_error(&DbErr::RecordNotFound("x".into())));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert!((100..=125).contains(&policy.backoff_ms(1)));
        assert!((400..=500).contains(&policy.backoff_ms(3)));
        assert!((2000..=2500).contains(&policy.backoff_ms(12)));
    }

    #[tokio::test]
    async fn test_run_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DbErr::ConnectionAcquire(
                            sea_orm::error::ConnAcquireErr::Timeout,
                        ))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_gives_up_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = fast_policy(3)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DbErr::RecordNotFound("gone".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
