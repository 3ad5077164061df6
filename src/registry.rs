//! Deferred registry for correlating replies with outstanding calls.
//!
//! Each registration allocates a fresh id, arms a deadline timer and hands
//! back a [`Deferred`] future. Whichever happens first (settlement, expiry,
//! cancellation) removes the entry; everything after that is a registry miss.
//! The registry knows nothing about transports.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::timer::DeadlineTimer;

/// Why a deferred did not resolve.
#[derive(Debug, Error, PartialEq)]
pub enum DeferredError<E> {
    /// The operation was settled with a failure.
    #[error("{0}")]
    Rejected(E),

    /// No settlement arrived before the deadline.
    #[error("timed out after {} ms", .0.as_millis())]
    TimedOut(Duration),

    /// The registry was cleared before settlement.
    #[error("operation cancelled")]
    Cancelled,
}

type Outcome<T, E> = Result<T, DeferredError<E>>;

struct PendingOperation<T, E> {
    settle: oneshot::Sender<Outcome<T, E>>,
    created_at: Instant,
    _timer: DeadlineTimer,
}

struct Inner<T, E> {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingOperation<T, E>>>,
}

impl<T, E> Inner<T, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingOperation<T, E>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take(&self, id: u64) -> Option<PendingOperation<T, E>> {
        self.lock().remove(&id)
    }

    fn expire(&self, id: u64, timeout: Duration) {
        if let Some(op) = self.take(id) {
            tracing::debug!(id, timeout_ms = timeout.as_millis() as u64, "operation timed out");
            let _ = op.settle.send(Err(DeferredError::TimedOut(timeout)));
        }
    }
}

/// Map of correlation id to pending result holder.
///
/// Ids start at 1, increase monotonically and are never reused.
pub struct DeferredRegistry<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for DeferredRegistry<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for DeferredRegistry<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> DeferredRegistry<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new pending operation that expires after `timeout`.
    ///
    /// Must be called inside a tokio runtime (the deadline runs as a task).
    pub fn register(&self, timeout: Duration) -> Deferred<T, E> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        let weak = Arc::downgrade(&self.inner);

        // Hold the lock while arming so an immediate expiry cannot miss the entry.
        let mut pending = self.inner.lock();
        let timer = DeadlineTimer::arm(timeout, move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire(id, timeout);
            }
        });
        pending.insert(
            id,
            PendingOperation {
                settle: tx,
                created_at: Instant::now(),
                _timer: timer,
            },
        );
        drop(pending);

        Deferred { id, rx }
    }

    /// Settle an operation. Returns `false` on a registry miss.
    pub fn settle(&self, id: u64, outcome: Result<T, E>) -> bool {
        match self.inner.take(id) {
            Some(op) => {
                tracing::debug!(
                    id,
                    elapsed_ms = op.created_at.elapsed().as_millis() as u64,
                    success = outcome.is_ok(),
                    "operation settled"
                );
                let _ = op.settle.send(outcome.map_err(DeferredError::Rejected));
                true
            }
            None => {
                tracing::debug!(id, "no pending operation for id, dropping settlement");
                false
            }
        }
    }

    pub fn resolve(&self, id: u64, value: T) -> bool {
        self.settle(id, Ok(value))
    }

    pub fn reject(&self, id: u64, error: E) -> bool {
        self.settle(id, Err(error))
    }

    /// Cancel every pending operation. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (_, op) in drained {
            let _ = op.settle.send(Err(DeferredError::Cancelled));
        }
        count
    }

    /// Reject every pending operation with an error built per id.
    pub fn reject_all<F>(&self, mut make_error: F) -> usize
    where
        F: FnMut(u64) -> E,
    {
        let drained: Vec<_> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (id, op) in drained {
            let _ = op.settle.send(Err(DeferredError::Rejected(make_error(id))));
        }
        count
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Future side of a registered operation.
#[derive(Debug)]
pub struct Deferred<T, E> {
    id: u64,
    rx: oneshot::Receiver<Outcome<T, E>>,
}

impl<T, E> Deferred<T, E> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T, E> Future for Deferred<T, E> {
    type Output = Outcome<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender dropped without settling: the registry itself went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(DeferredError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
