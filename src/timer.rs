//! Cancellable deadline timers.
//!
//! A [`DeadlineTimer`] runs a callback once after a fixed delay unless it is
//! cancelled or dropped first. Timers never renew.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// One-shot timer backed by a spawned tokio task.
///
/// Dropping the timer cancels it.
#[derive(Debug)]
pub struct DeadlineTimer {
    token: CancellationToken,
}

impl DeadlineTimer {
    /// Arm a timer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn arm<F>(duration: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(duration) => on_expire(),
            }
        });

        Self { token }
    }

    /// Cancel the timer. The callback will not run if it has not already.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
