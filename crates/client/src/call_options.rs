//! Call option presets and the retry/backoff driver.
//!
//! Built on a jittered, capped, coefficient-driven exponential backoff,
//! generalized to drive gRPC calls: retry is keyed off the response's
//! `tonic::Code`
//! rather than an application error-type string, and every preset also
//! carries an overall deadline the retry loop never exceeds.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tonic::{Code, Status};

/// One of the three presets a [`crate::bridge::BridgeClient`] call picks
/// from. Each wraps a unary RPC in jittered exponential backoff bounded
/// by an overall deadline.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    pub retryable_codes: &'static [Code],
    pub overall_deadline: Duration,
}

const DEFAULT_RETRYABLE: &[Code] = &[
    Code::DataLoss,
    Code::Internal,
    Code::Unknown,
    Code::ResourceExhausted,
    Code::Aborted,
    Code::OutOfRange,
    Code::Unavailable,
];

const TASK_POLL_RETRYABLE: &[Code] = &[
    Code::DataLoss,
    Code::Internal,
    Code::Unknown,
    Code::ResourceExhausted,
    Code::Aborted,
    Code::OutOfRange,
    Code::Unavailable,
    Code::Cancelled,
    Code::DeadlineExceeded,
];

impl CallOptions {
    /// General-purpose client RPCs.
    pub fn default_preset() -> Self {
        CallOptions {
            max_attempts: 5,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_coefficient: 1.7,
            retryable_codes: DEFAULT_RETRYABLE,
            overall_deadline: Duration::from_secs(30),
        }
    }

    /// Worker long-poll RPCs (PollWorkflowTaskQueue, PollActivityTaskQueue).
    pub fn task_poll() -> Self {
        CallOptions {
            max_attempts: 5,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2.0,
            retryable_codes: TASK_POLL_RETRYABLE,
            overall_deadline: Duration::from_secs(70),
        }
    }

    /// Handle-driven long-polls from the external client (`result()`,
    /// history long-poll).
    pub fn user_poll() -> Self {
        CallOptions {
            max_attempts: 5,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2.0,
            retryable_codes: DEFAULT_RETRYABLE,
            overall_deadline: Duration::from_secs(70),
        }
    }

    fn is_retryable(&self, status: &Status) -> bool {
        self.retryable_codes.contains(&status.code())
    }

    /// Backoff for the Nth retry (1-based: the delay taken before attempt
    /// `attempt + 1`), jittered by ±20% to avoid thundering herds.
    fn delay_for_retry(&self, retry_num: u32) -> Duration {
        let base =
            self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(retry_num as i32);
        let capped = base.min(self.max_interval.as_secs_f64());
        let jitter_range = capped * 0.2;
        let jittered = if jitter_range > 0.0 {
            let offset = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Drives `f` under `options`, retrying on retryable status codes until
/// either a non-retryable error, the attempt budget, or the overall
/// deadline is reached — whichever comes first.
pub async fn call_with_retry<F, Fut, T>(options: &CallOptions, mut f: F) -> Result<T, Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    let deadline = Instant::now() + options.overall_deadline;
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(status) => {
                let now = Instant::now();
                if attempt >= options.max_attempts
                    || !options.is_retryable(&status)
                    || now >= deadline
                {
                    return Err(status);
                }
                let remaining = deadline - now;
                let delay = options.delay_for_retry(attempt - 1).min(remaining);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let options = CallOptions::default_preset();
        let result: Result<u32, Status> = call_with_retry(&options, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_retryable_status_until_success() {
        let options = CallOptions::default_preset()
            .clone_with_short_backoff();
        let attempts = AtomicU32::new(0);
        let result = call_with_retry(&options, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Status::unavailable("retry me"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_status() {
        let options = CallOptions::default_preset().clone_with_short_backoff();
        let attempts = AtomicU32::new(0);
        let result: Result<(), Status> = call_with_retry(&options, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Status::not_found("gone"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let options = CallOptions::default_preset().clone_with_short_backoff();
        let attempts = AtomicU32::new(0);
        let result: Result<(), Status> = call_with_retry(&options, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Status::unavailable("still down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), options.max_attempts);
    }

    impl CallOptions {
        /// Test-only helper: shrink intervals so retry tests don't sleep
        /// for real wall-clock seconds.
        fn clone_with_short_backoff(&self) -> Self {
            CallOptions {
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(5),
                ..self.clone()
            }
        }
    }
}
