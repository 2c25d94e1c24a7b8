//! FIFO admission gate for outbound API calls
//!
//! A [`RateLimiter`] admits callers one at a time, at most `rps` per second,
//! strictly in the order they called [`RateLimiter::acquire`]. Pending
//! callers wait on a oneshot channel; a single processing task per limiter
//! releases them, sleeping between admissions as needed.
//!
//! The limiter is independent of the session subsystem and can wrap any
//! async operation.

use crate::error::{QuireError, Result};
use metrics::increment_counter;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct LimiterState {
    queue: VecDeque<oneshot::Sender<()>>,
    running: bool,
    last_admitted: Option<Instant>,
}

#[derive(Debug)]
struct LimiterInner {
    interval: Duration,
    max_queue: Option<usize>,
    state: Mutex<LimiterState>,
}

impl LimiterInner {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Rate limiter admitting callers in FIFO order
///
/// Clones share the same queue.
///
/// # Examples
///
/// ```
/// use quire::ratelimit::RateLimiter;
///
/// # #[tokio::main]
/// # async fn main() {
/// let limiter = RateLimiter::new(10.0).unwrap();
/// let value = limiter.with_rate_limit(|| async { 42 }).await.unwrap();
/// assert_eq!(value, 42);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

impl RateLimiter {
    /// Create an unbounded limiter admitting `rps` callers per second
    ///
    /// # Errors
    ///
    /// Returns `QuireError::Config` when `rps` is not a positive number.
    pub fn new(rps: f64) -> Result<Self> {
        Self::build(rps, None)
    }

    /// Create a limiter that rejects callers once `max_queue` are waiting
    ///
    /// # Errors
    ///
    /// Returns `QuireError::Config` when `rps` is not a positive number or
    /// `max_queue` is zero.
    pub fn bounded(rps: f64, max_queue: usize) -> Result<Self> {
        if max_queue == 0 {
            return Err(
                QuireError::Config("Rate limiter max_queue must be at least 1".to_string()).into(),
            );
        }
        Self::build(rps, Some(max_queue))
    }

    fn build(rps: f64, max_queue: Option<usize>) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(LimiterInner {
                interval: interval_for(rps)?,
                max_queue,
                state: Mutex::new(LimiterState::default()),
            }),
        })
    }

    /// Minimum spacing between two admissions
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Wait for admission
    ///
    /// # Errors
    ///
    /// Returns `QuireError::RateLimitQueueFull` when a bounded queue is full
    /// and `QuireError::AdmissionCancelled` when [`RateLimiter::clear`] drops
    /// this caller before admission.
    pub async fn acquire(&self) -> Result<()> {
        let (rx, start) = {
            let mut state = self.inner.lock();
            if let Some(limit) = self.inner.max_queue {
                state.queue.retain(|tx| !tx.is_closed());
                if state.queue.len() >= limit {
                    return Err(QuireError::RateLimitQueueFull { limit }.into());
                }
            }
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            let start = !state.running;
            state.running = true;
            (rx, start)
        };

        if start {
            tokio::spawn(process(Arc::clone(&self.inner)));
        }

        rx.await.map_err(|_| QuireError::AdmissionCancelled.into())
    }

    /// Wait for admission, then run `f`
    pub async fn with_rate_limit<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await?;
        Ok(f().await)
    }

    /// Number of callers still waiting
    pub fn queue_length(&self) -> usize {
        self.inner
            .lock()
            .queue
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Drop every pending admission
    ///
    /// Dropped callers get `QuireError::AdmissionCancelled`.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.inner.lock();
            std::mem::take(&mut state.queue)
        };
        if !dropped.is_empty() {
            tracing::warn!("Rate limiter cleared {} pending admissions", dropped.len());
        }
    }
}

/// Spacing between admissions for a rate of `rps` per second
///
/// # Errors
///
/// Returns `QuireError::Config` when `rps` is not positive or is so small
/// that the interval does not fit in a `Duration`.
pub fn interval_for(rps: f64) -> Result<Duration> {
    if !rps.is_finite() || rps <= 0.0 {
        return Err(QuireError::Config(format!(
            "Rate limiter needs a positive requests_per_second, got {}",
            rps
        ))
        .into());
    }
    Duration::try_from_secs_f64(1.0 / rps).map_err(|e| {
        QuireError::Config(format!("requests_per_second {} is too small: {}", rps, e)).into()
    })
}

async fn process(inner: Arc<LimiterInner>) {
    loop {
        let wait = {
            let mut state = inner.lock();
            if state.queue.is_empty() {
                state.running = false;
                return;
            }
            state
                .last_admitted
                .map(|last| (last + inner.interval).saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO)
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut state = inner.lock();
        while let Some(tx) = state.queue.pop_front() {
            // A caller that gave up does not use a slot.
            if tx.send(()).is_ok() {
                state.last_admitted = Some(Instant::now());
                increment_counter!("quire_rate_limiter_admissions_total");
                break;
            }
        }
    }
}
