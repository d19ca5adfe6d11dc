//! Retry utilities with exponential backoff and jitter
//!
//! Used for cloud reads that are expected to fail transiently in a known
//! way, most prominently the read issued right after a create against an
//! eventually-consistent API. The caller supplies a predicate deciding which
//! errors are worth retrying; everything else halts the loop immediately.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::warn;

/// Backoff configuration for operations that may fail transiently
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay between attempts
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each attempt
    pub multiplier: f64,

    /// Wall-clock budget across all attempts; unlimited when `None`
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed: None,
        }
    }
}

impl BackoffConfig {
    /// Create a config bounded by the given wall-clock budget
    pub fn with_max_elapsed(budget: Duration) -> Self {
        Self {
            max_elapsed: Some(budget),
            ..Default::default()
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// The wall-clock budget ran out before the operation succeeded
    Exhausted {
        /// Attempts performed, including the final failing one
        attempts: u32,
        /// The last error observed
        source: E,
    },

    /// The operation failed with an error the predicate refused to retry
    Halted {
        /// Attempts performed, including the failing one
        attempts: u32,
        /// The non-retryable error
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts performed before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Halted { attempts, .. } => *attempts,
        }
    }

    /// Consume the wrapper, yielding the underlying error
    pub fn into_source(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::Halted { source, .. } => source,
        }
    }
}

/// Execute an async operation with exponential backoff and jitter, retrying
/// as long as `retryable` approves of the error and the budget allows.
///
/// The delay is jittered between 0.5x and 1.5x to avoid thundering herds.
/// The budget check happens before sleeping, so the loop overruns the budget
/// by at most one backoff step.
pub async fn retry_if<F, Fut, T, E, P>(
    config: &BackoffConfig,
    operation_name: &str,
    mut operation: F,
    mut retryable: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: FnMut(&E) -> bool,
{
    let started = Instant::now();
    let mut delay = config.initial_delay;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !retryable(&error) => {
                return Err(RetryError::Halted {
                    attempts,
                    source: error,
                })
            }
            Err(error) => error,
        };

        // jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        if let Some(budget) = config.max_elapsed {
            if started.elapsed() + jittered >= budget {
                return Err(RetryError::Exhausted {
                    attempts,
                    source: error,
                });
            }
        }

        warn!(
            operation = %operation_name,
            attempt = attempts,
            error = %error,
            delay_ms = jittered.as_millis() as u64,
            "operation failed, retrying"
        );

        tokio::time::sleep(jittered).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.multiplier)
                .min(config.max_delay.as_secs_f64()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_elapsed: Some(Duration::from_millis(200)),
        }
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<i32, RetryError<&str>> =
            retry_if(&fast_config(), "op", || async { Ok(42) }, |_| true).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_succeeds_after_retryable_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, RetryError<&str>> = retry_if(
            &fast_config(),
            "op",
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_halts_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, RetryError<&str>> = retry_if(
            &fast_config(),
            "op",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            },
            |e| *e != "fatal",
        )
        .await;

        match result.unwrap_err() {
            RetryError::Halted { attempts, source } => {
                assert_eq!(attempts, 1);
                assert_eq!(source, "fatal");
            }
            RetryError::Exhausted { .. } => panic!("expected halt, not exhaustion"),
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// The budget bounds the loop to within one backoff step, so with a
    /// paused clock the loop must exit with Exhausted rather than spin.
    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_reports_attempts() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            max_elapsed: Some(Duration::from_secs(10)),
        };
        let started = Instant::now();

        let result: Result<i32, RetryError<&str>> =
            retry_if(&config, "op", || async { Err("still missing") }, |_| true).await;

        match result.unwrap_err() {
            RetryError::Exhausted { attempts, source } => {
                assert!(attempts >= 2, "should have retried at least once");
                assert_eq!(source, "still missing");
            }
            RetryError::Halted { .. } => panic!("expected exhaustion"),
        }
        assert!(started.elapsed() <= Duration::from_secs(11));
    }
}
