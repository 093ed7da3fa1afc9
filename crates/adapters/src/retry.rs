use std::sync::Arc;
use std::time::Duration;

use bedtime_core::{GenerationError, RetrySettings};
use log::{debug, warn};

use crate::error::{ProviderError, ProviderErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryConfig {
    pub const fn new(max_retries: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            timeout,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_retries, settings.base_delay(), settings.timeout())
    }
}

/// Final value (or last classified error) plus how many invocations it took.
#[derive(Debug)]
pub struct ProviderAttemptResult<T> {
    pub outcome: Result<T, ProviderError>,
    pub attempts: u32,
}

impl<T> ProviderAttemptResult<T> {
    pub fn into_result(self) -> Result<T, ProviderError> {
        self.outcome
    }
}

/// Runs blocking provider calls on the blocking pool under a per-attempt timeout.
///
/// Timeout, rate-limit and connection failures are retried with linear backoff
/// (`attempt * base_delay`); model failures are returned after the first attempt.
/// A timed-out worker keeps running in the background: the await is dropped, the
/// blocking call is not interrupted.
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn run<F, T>(&self, provider: &str, operation: &str, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Result<T, GenerationError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.run_counted(provider, operation, call).await.outcome
    }

    pub async fn run_counted<F, T>(
        &self,
        provider: &str,
        operation: &str,
        call: F,
    ) -> ProviderAttemptResult<T>
    where
        F: Fn() -> Result<T, GenerationError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let call = Arc::new(call);
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let worker = Arc::clone(&call);
            let handle = tokio::task::spawn_blocking(move || (*worker)());

            let error = match tokio::time::timeout(self.config.timeout, handle).await {
                Ok(Ok(Ok(value))) => {
                    if attempt > 1 {
                        debug!("[retry] {provider} {operation} succeeded on attempt {attempt}");
                    }
                    return ProviderAttemptResult {
                        outcome: Ok(value),
                        attempts: attempt,
                    };
                }
                Ok(Ok(Err(err))) => ProviderError::classify(provider, operation, err),
                Ok(Err(join_err)) => ProviderError::new(
                    ProviderErrorKind::Model,
                    provider,
                    operation,
                    GenerationError::new(join_err),
                ),
                Err(elapsed) => ProviderError::new(
                    ProviderErrorKind::Timeout,
                    provider,
                    operation,
                    GenerationError::new(elapsed),
                ),
            };

            if !error.is_retryable() || attempt >= max_attempts {
                warn!(
                    "[retry] {provider} {operation} giving up after attempt {attempt}/{max_attempts}: {error}"
                );
                return ProviderAttemptResult {
                    outcome: Err(error),
                    attempts: attempt,
                };
            }

            let delay = self.config.base_delay.saturating_mul(attempt);
            warn!(
                "[retry] {provider} {operation} attempt {attempt}/{max_attempts} failed ({}), retrying in {delay:?}",
                error.kind
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    fn executor(max_retries: u32, timeout: Duration) -> RetryExecutor {
        RetryExecutor::new(RetryConfig::new(
            max_retries,
            Duration::from_millis(1),
            timeout,
        ))
    }

    #[tokio::test]
    async fn retries_timeouts_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = executor(3, Duration::from_secs(5))
            .run_counted("cloud-model", "generate_story", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(GenerationError::new(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "read timed out",
                    )))
                } else {
                    Ok("goodnight")
                }
            })
            .await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.into_result().unwrap(), "goodnight");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn model_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = executor(3, Duration::from_secs(5))
            .run_counted("cloud-model", "generate_story", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GenerationError::msg("content policy rejected the prompt"))
            })
            .await;

        let err = result.outcome.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Model);
        assert_eq!(err.provider, "cloud-model");
        assert_eq!(err.operation, "generate_story");
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_classified_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let err = executor(2, Duration::from_secs(5))
            .run("local-model", "narrate", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GenerationError::msg("429 Too Many Requests"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::RateLimit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result = executor(2, Duration::from_millis(20))
            .run_counted("companion", "render_frame", || {
                thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome.unwrap_err().kind, ProviderErrorKind::Timeout);
    }

    #[tokio::test]
    async fn panicking_worker_is_a_model_error() {
        let result = executor(3, Duration::from_secs(5))
            .run_counted("companion", "generate_story", || -> Result<(), GenerationError> {
                panic!("decoder crashed")
            })
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome.unwrap_err().kind, ProviderErrorKind::Model);
    }

    #[test]
    fn config_follows_settings() {
        let settings = RetrySettings {
            max_retries: 5,
            base_delay_ms: 250,
            timeout_secs: 30,
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
