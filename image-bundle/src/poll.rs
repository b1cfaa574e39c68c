//! Bounded polling for provider resources that become ready eventually.
//!
//! `wait_until` calls `fetch` right away and then once per interval until it
//! yields a value or the deadline passes. `fetch` folds the readiness check
//! into its result: `None` means "not ready yet", whatever the reason.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Observed provider propagation delay for snapshots and new images.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub deadline: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollSettings {
    pub fn new(deadline: Duration, interval: Duration) -> Self {
        Self { deadline, interval }
    }

    /// Zero durations would spin; clamp both to at least one millisecond and
    /// never let the interval exceed the deadline.
    pub fn normalized(self) -> Self {
        let floor = Duration::from_millis(1);
        let deadline = self.deadline.max(floor);
        let interval = self.interval.max(floor).min(deadline);
        Self { deadline, interval }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },
    #[error("polling cancelled")]
    Cancelled,
}

/// Repeatedly evaluates `fetch` until it yields a value.
///
/// Sleeps between attempts are shortened so the last attempt lands exactly on
/// the deadline, which bounds the failure time to `[deadline, deadline + interval)`.
pub async fn wait_until<T, F, Fut>(
    settings: PollSettings,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let PollSettings { deadline, interval } = settings.normalized();
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            value = fetch() => value,
        };
        if let Some(value) = fetched {
            tracing::debug!(attempt, elapsed = ?started.elapsed(), "poll ready");
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= deadline {
            tracing::debug!(attempt, ?elapsed, "poll deadline exceeded");
            return Err(PollError::DeadlineExceeded { elapsed });
        }

        let pause = interval.min(deadline - elapsed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = sleep(pause) => {}
        }
    }
}
