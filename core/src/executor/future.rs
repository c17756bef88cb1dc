//! Futures and combinators
//!
//! A [`Future`] is a single-assignment slot shared between the task that
//! produces it and every caller that awaits it. The first of `resolve`,
//! `reject` or `cancel` wins; later calls are no-ops.
//!
//! Async bodies run on the tokio blocking pool when a runtime is active and
//! on a dedicated thread otherwise. `await` blocks the calling thread.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::errors::RuntimeError;
use super::types::Value;

/// How often `await_with_context` re-checks its cancellation token
const CONTEXT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub enum FutureState {
    Pending,
    Resolved(Value),
    Rejected(RuntimeError),
}

struct Shared {
    state: Mutex<FutureState>,
    settled: Condvar,
    cancelled: AtomicBool,
}

#[derive(Clone)]
pub struct Future {
    shared: Arc<Shared>,
}

impl Future {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(FutureState::Pending),
                settled: Condvar::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn resolve(&self, value: Value) -> bool {
        self.settle(FutureState::Resolved(value), false)
    }

    pub fn reject(&self, error: RuntimeError) -> bool {
        self.settle(FutureState::Rejected(error), false)
    }

    /// Reject with a cancellation error and raise the cancellation flag.
    /// Has no effect once the future has settled.
    pub fn cancel(&self) -> bool {
        self.settle(FutureState::Rejected(RuntimeError::Cancellation), true)
    }

    fn settle(&self, next: FutureState, cancelling: bool) -> bool {
        let mut state = self.shared.state.lock();
        if !matches!(*state, FutureState::Pending) {
            return false;
        }
        if cancelling {
            self.shared.cancelled.store(true, Ordering::SeqCst);
        }
        trace!(state = ?next, "future settled");
        *state = next;
        self.shared.settled.notify_all();
        true
    }

    /// Flag polled by the producing task
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> FutureState {
        self.shared.state.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.shared.state.lock(), FutureState::Pending)
    }

    pub fn same_as(&self, other: &Future) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Block until settled
    pub fn wait(&self) -> Result<Value, RuntimeError> {
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                FutureState::Pending => self.shared.settled.wait(&mut state),
                FutureState::Resolved(value) => return Ok(value.clone()),
                FutureState::Rejected(err) => return Err(err.clone()),
            }
        }
    }

    /// Block until settled or until `timeout` elapses. The producer keeps
    /// running after a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Value, RuntimeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                FutureState::Resolved(value) => return Ok(value.clone()),
                FutureState::Rejected(err) => return Err(err.clone()),
                FutureState::Pending => {
                    if self
                        .shared
                        .settled
                        .wait_until(&mut state, deadline)
                        .timed_out()
                        && matches!(*state, FutureState::Pending)
                    {
                        return Err(RuntimeError::Timeout(timeout));
                    }
                }
            }
        }
    }

    /// Block until settled, cancelling the future when `token` fires or the
    /// optional `deadline` passes.
    pub fn wait_with_context(
        &self,
        token: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Value, RuntimeError> {
        let started = Instant::now();
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                FutureState::Resolved(value) => return Ok(value.clone()),
                FutureState::Rejected(err) => return Err(err.clone()),
                FutureState::Pending => {}
            }

            let now = Instant::now();
            let expired = deadline.map_or(false, |d| now >= d);
            if token.is_cancelled() || expired {
                drop(state);
                self.cancel();
                return Err(if expired {
                    RuntimeError::Timeout(started.elapsed())
                } else {
                    RuntimeError::Cancellation
                });
            }

            let wake = match deadline {
                Some(d) => d.min(now + CONTEXT_POLL_INTERVAL),
                None => now + CONTEXT_POLL_INTERVAL,
            };
            self.shared.settled.wait_until(&mut state, wake);
        }
    }
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &*self.shared.state.lock() {
            FutureState::Pending => "pending",
            FutureState::Resolved(_) => "resolved",
            FutureState::Rejected(_) => "rejected",
        };
        write!(f, "Future({})", label)
    }
}

/// Run `work` off the current thread
fn spawn_detached<F>(work: F) -> std::io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(work);
            Ok(())
        }
        Err(_) => std::thread::Builder::new()
            .name("cadence-async".to_string())
            .spawn(work)
            .map(|_| ()),
    }
}

fn settle_with(future: &Future, outcome: Result<Value, RuntimeError>) {
    match outcome {
        Ok(value) => future.resolve(value),
        Err(err) => future.reject(err),
    };
}

/// Start `body` concurrently and return its future immediately.
///
/// The cancellation flag is checked before the body starts and again before
/// its outcome is published.
pub fn run_async<F>(body: F) -> Future
where
    F: FnOnce(&Future) -> Result<Value, RuntimeError> + Send + 'static,
{
    let future = Future::new();
    let handle = future.clone();
    let spawned = spawn_detached(move || {
        if handle.is_cancelled() {
            return;
        }
        let outcome = body(&handle);
        if handle.is_cancelled() {
            return;
        }
        settle_with(&handle, outcome);
    });
    if let Err(e) = spawned {
        future.reject(RuntimeError::Internal(format!("failed to spawn async task: {}", e)));
    }
    future
}

/// All - wait in index order, fail fast on the first rejection
pub fn all(futures: Vec<Future>) -> Future {
    debug!(count = futures.len(), "all");
    run_async(move |_| {
        let mut values = Vec::with_capacity(futures.len());
        for (idx, future) in futures.iter().enumerate() {
            match future.wait() {
                Ok(value) => values.push(value),
                Err(err) => {
                    for later in &futures[idx + 1..] {
                        later.cancel();
                    }
                    return Err(err);
                }
            }
        }
        Ok(Value::Array(values))
    })
}

/// Race - settle with whichever input settles first, then cancel the rest
pub fn race(futures: Vec<Future>) -> Future {
    let result = Future::new();
    if futures.is_empty() {
        result.reject(RuntimeError::arity("race called with no futures"));
        return result;
    }
    debug!(count = futures.len(), "race");

    let decided = Arc::new(AtomicBool::new(false));
    for idx in 0..futures.len() {
        let inputs = futures.clone();
        let result_handle = result.clone();
        let decided = Arc::clone(&decided);
        let spawned = spawn_detached(move || {
            let outcome = inputs[idx].wait();
            if decided.swap(true, Ordering::SeqCst) {
                return;
            }
            for (other_idx, other) in inputs.iter().enumerate() {
                if other_idx != idx {
                    other.cancel();
                }
            }
            settle_with(&result_handle, outcome);
        });
        if let Err(e) = spawned {
            result.reject(RuntimeError::Internal(format!("failed to spawn race watcher: {}", e)));
        }
    }
    result
}

/// Any - resolve on the first success and cancel the rest, reject once
/// every input has failed
pub fn any(futures: Vec<Future>) -> Future {
    let result = Future::new();
    if futures.is_empty() {
        result.reject(RuntimeError::arity("any called with no futures"));
        return result;
    }
    debug!(count = futures.len(), "any");

    let failures: Arc<Mutex<Vec<Option<RuntimeError>>>> =
        Arc::new(Mutex::new(vec![None; futures.len()]));
    for idx in 0..futures.len() {
        let inputs = futures.clone();
        let result_handle = result.clone();
        let failures = Arc::clone(&failures);
        let spawned = spawn_detached(move || match inputs[idx].wait() {
            Ok(value) => {
                if result_handle.resolve(value) {
                    for (other_idx, other) in inputs.iter().enumerate() {
                        if other_idx != idx {
                            other.cancel();
                        }
                    }
                }
            }
            Err(err) => {
                let mut slots = failures.lock();
                slots[idx] = Some(err);
                if slots.iter().all(Option::is_some) {
                    let errors = slots.iter_mut().filter_map(Option::take).collect();
                    drop(slots);
                    result_handle.reject(RuntimeError::AllRejected { errors });
                }
            }
        });
        if let Err(e) = spawned {
            result.reject(RuntimeError::Internal(format!("failed to spawn any watcher: {}", e)));
        }
    }
    result
}
