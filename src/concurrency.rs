//! Concurrency Primitives
//!
//! The shared stage limiter and the panic-isolation boundary every spawned unit of work
//! runs behind. A limiter slot is held by a guard, so it is returned on every exit path,
//! including unwinding out of a panicking stage.

use crate::error::ApiError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, trace};

#[derive(Debug, Default)]
struct LimiterState {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting gate bounding how many content generation stages run at once.
///
/// Cloning is cheap and every clone shares the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    state: Arc<LimiterState>,
}

impl ConcurrencyLimiter {
    pub const DEFAULT_MULTIPLIER: usize = 2;

    /// Create a limiter with a fixed capacity (at least one slot).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            state: Arc::new(LimiterState::default()),
        }
    }

    /// Capacity derived from available CPU parallelism times `multiplier`.
    pub fn from_available_parallelism(multiplier: usize) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cores.saturating_mul(multiplier.max(1)))
    }

    /// Wait for a free slot. The slot is released when the returned permit drops.
    pub async fn acquire(&self) -> Result<LimiterPermit, ApiError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ApiError::LimiterClosed)?;

        let held = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(held, Ordering::SeqCst);
        trace!(held, capacity = self.capacity, "Limiter slot acquired");

        Ok(LimiterPermit {
            state: Arc::clone(&self.state),
            _permit: permit,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at the same time.
    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

/// A held limiter slot.
pub struct LimiterPermit {
    state: Arc<LimiterState>,
    // Dropped after `Drop::drop` runs, so the in-flight count falls before the slot frees.
    _permit: OwnedSemaphorePermit,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run `future`, converting a panic into [`ApiError::TaskPanicked`].
///
/// Use this as the body of anything handed to `tokio::spawn` or a `JoinSet`, so a
/// panicking child surfaces to its parent as an ordinary failed result.
pub async fn isolate<F, T>(task: String, future: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(task = %task, panic = %message, "Task panicked, treating as failure");
            Err(ApiError::TaskPanicked { task, message })
        }
    }
}

/// Spawn `future` onto the runtime behind the panic boundary.
pub fn spawn_isolated<F, T>(task: impl Into<String>, future: F) -> JoinHandle<Result<T, ApiError>>
where
    F: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(isolate(task.into(), future))
}

/// Collapse a join result from an isolated task into a single `Result`.
pub fn flatten_join<T>(
    task: &str,
    joined: Result<Result<T, ApiError>, JoinError>,
) -> Result<T, ApiError> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(ApiError::TaskPanicked {
            task: task.to_string(),
            message: panic_message(err.into_panic().as_ref()),
        }),
        Err(_) => Err(ApiError::TaskCancelled {
            task: task.to_string(),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
