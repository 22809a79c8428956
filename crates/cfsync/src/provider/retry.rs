use super::{EventPage, OutputsSnapshot, ProviderResult, StackProvider};
use crate::stack::Stack;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Exponential backoff with full jitter for throttled requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the delay before retry number `attempt` (starting at 0)
    pub fn max_delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.max_delay_for(attempt).as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }

    /// Runs `call` until it succeeds, fails with something other than throttling, or runs out of
    /// attempts
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(err) if err.is_throttled() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "request throttled, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// [StackProvider] decorator that retries throttled calls
pub struct Retrying {
    inner: Arc<dyn StackProvider>,
    policy: RetryPolicy,
}

impl Retrying {
    pub fn new(inner: Arc<dyn StackProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl StackProvider for Retrying {
    async fn stack_exists(&self, name: &str) -> ProviderResult<bool> {
        self.policy
            .run("stack_exists", || self.inner.stack_exists(name))
            .await
    }

    async fn stacks_outputs(&self) -> ProviderResult<OutputsSnapshot> {
        self.policy
            .run("stacks_outputs", || self.inner.stacks_outputs())
            .await
    }

    async fn stack_parameters(&self, name: &str) -> ProviderResult<IndexMap<String, String>> {
        self.policy
            .run("stack_parameters", || self.inner.stack_parameters(name))
            .await
    }

    async fn stack_status(&self, name: &str) -> ProviderResult<String> {
        self.policy
            .run("stack_status", || self.inner.stack_status(name))
            .await
    }

    async fn stack_events(
        &self,
        name: &str,
        page_token: Option<&str>,
    ) -> ProviderResult<EventPage> {
        self.policy
            .run("stack_events", || self.inner.stack_events(name, page_token))
            .await
    }

    async fn create_stack(&self, stack: &Stack) -> ProviderResult<()> {
        self.policy
            .run("create_stack", || self.inner.create_stack(stack))
            .await
    }

    async fn update_stack(&self, stack: &Stack) -> ProviderResult<()> {
        self.policy
            .run("update_stack", || self.inner.update_stack(stack))
            .await
    }

    async fn delete_stack(&self, name: &str) -> ProviderResult<()> {
        self.policy
            .run("delete_stack", || self.inner.delete_stack(name))
            .await
    }

    async fn validate_template(&self, template_body: &str) -> ProviderResult<()> {
        self.policy
            .run("validate_template", || {
                self.inner.validate_template(template_body)
            })
            .await
    }

    async fn server_time(&self) -> ProviderResult<DateTime<Utc>> {
        self.policy
            .run("server_time", || self.inner.server_time())
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::{ProviderError, ProviderErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttled() -> ProviderError {
        ProviderError::new(ProviderErrorKind::Throttled, "op", "Rate exceeded")
    }

    #[test]
    fn delays_grow_and_are_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.max_delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.max_delay_for(10), Duration::from_secs(30));
        for attempt in 0..6 {
            assert!(policy.delay_for(attempt) <= policy.max_delay_for(attempt));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_throttling_until_success() {
        let calls = &AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("op", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(throttled())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: ProviderResult<()> = RetryPolicy::default()
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(throttled())
            })
            .await;

        assert!(result.unwrap_err().is_throttled());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: ProviderResult<()> = RetryPolicy::default()
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::new(ProviderErrorKind::Other, "op", "boom"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
