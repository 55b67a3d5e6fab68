//! Cancellable timers.
//!
//! A [`TimerGuard`] owns a spawned tokio task and aborts it when dropped, so
//! a pending reply or a running reveal ticker can never outlive the session
//! that scheduled it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Owns a scheduled task; dropping the guard cancels the task.
#[derive(Debug)]
pub struct TimerGuard {
    handle: Option<JoinHandle<()>>,
}

impl TimerGuard {
    /// Cancel the task now.
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the task without cancelling it. Used by a task that is
    /// retiring its own guard.
    pub fn disarm(mut self) {
        self.handle.take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Run `f` once after `delay`. Must be called within a tokio runtime.
pub fn after<F>(delay: Duration, f: F) -> TimerGuard
where
    F: FnOnce() + Send + 'static,
{
    spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    })
}

/// Run `fut` as a cancellable task. Must be called within a tokio runtime.
pub fn spawn<Fut>(fut: Fut) -> TimerGuard
where
    Fut: Future<Output = ()> + Send + 'static,
{
    TimerGuard {
        handle: Some(tokio::spawn(fut)),
    }
}
