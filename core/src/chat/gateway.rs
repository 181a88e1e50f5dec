//! Rate-limited gateway: every chat API call of a tick goes through here, one at a time.
//! Spaces calls by a minimum interval, honours server retry-after, and retries rate-limited
//! and transient failures with one shared backoff policy bounded by the tick deadline.
//! A send whose outcome is unknown is never repeated; the caller resyncs instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::transport::{ChatApiError, ChatTransport, MessageContent, MessageId};

/// Backoff curve shared by every chat call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * multiplier^(retry-1), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idempotent {
    Yes,
    No,
}

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

pub struct ChatGateway<T> {
    transport: Arc<T>,
    policy: RetryPolicy,
    min_interval: Duration,
    last_call: Option<Instant>,
    blocked_until: Option<Instant>,
    deadline: Option<Instant>,
    calls: u64,
}

impl<T> ChatGateway<T>
where
    T: ChatTransport,
{
    pub fn new(transport: Arc<T>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            min_interval: DEFAULT_MIN_INTERVAL,
            last_call: None,
            blocked_until: None,
            deadline: None,
            calls: 0,
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Latest instant a wait or retry may extend to. None = unbounded.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// API calls actually issued (including retries) since construction.
    pub fn calls_issued(&self) -> u64 {
        self.calls
    }

    pub async fn send(&mut self, content: &MessageContent) -> Result<MessageId, ChatApiError> {
        self.call("send", Idempotent::No, |t| async move { t.send(content).await }).await
    }

    pub async fn edit(&mut self, id: MessageId, content: &MessageContent) -> Result<(), ChatApiError> {
        self.call("edit", Idempotent::Yes, |t| async move { t.edit(id, content).await }).await
    }

    pub async fn delete(&mut self, id: MessageId) -> Result<(), ChatApiError> {
        self.call("delete", Idempotent::Yes, |t| async move { t.delete(id).await }).await
    }

    pub async fn list_messages(&mut self, limit: u8) -> Result<Vec<MessageId>, ChatApiError> {
        self.call("list", Idempotent::Yes, |t| async move { t.list_messages(limit).await }).await
    }

    async fn call<R, F, Fut>(&mut self, op: &'static str, idempotent: Idempotent, f: F) -> Result<R, ChatApiError>
    where
        F: Fn(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R, ChatApiError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if !self.pace().await {
                return Err(ChatApiError::Exhausted {
                    op,
                    attempts: attempt - 1,
                    last: "tick budget spent waiting for rate limit".into(),
                });
            }

            self.calls += 1;
            let result = f(Arc::clone(&self.transport)).await;
            self.last_call = Some(Instant::now());

            let err = match result {
                Ok(value) => {
                    self.blocked_until = None;
                    return Ok(value);
                }
                Err(err) => err,
            };
            if !err.is_retryable() || (idempotent == Idempotent::No && err.is_unconfirmed()) {
                return Err(err);
            }
            if attempt >= self.policy.max_attempts {
                return Err(ChatApiError::Exhausted {
                    op,
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let mut delay = self.policy.delay_for(attempt);
            if let ChatApiError::RateLimited {
                retry_after: Some(retry_after),
            } = &err
            {
                delay = delay.max(*retry_after);
            }
            let until = Instant::now() + delay;
            if self.deadline.is_some_and(|d| until > d) {
                return Err(ChatApiError::Exhausted {
                    op,
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            tracing::warn!(
                target_channel = %self.transport.target(),
                op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "chat call failed, backing off"
            );
            self.blocked_until = Some(until);
        }
    }

    /// Sleep until the next call is allowed. False when that would pass the deadline.
    async fn pace(&mut self) -> bool {
        let now = Instant::now();
        let spaced = self.last_call.map(|t| t + self.min_interval);
        let wait_until = match (self.blocked_until, spaced) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
        .filter(|t| *t > now);

        if let Some(until) = wait_until {
            if self.deadline.is_some_and(|d| until > d) {
                return false;
            }
            tokio::time::sleep_until(until).await;
        }
        true
    }
}
