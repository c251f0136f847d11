use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// One-shot, multi-waiter completion signal.
///
/// Producers call [`release`](Self::release) to mark the event as done;
/// consumers observe it either by blocking ([`wait`](Self::wait)) or by
/// suspending ([`wait_async`](Self::wait_async)). Once set the signal stays
/// set, so waiters arriving after the transition return immediately. A single
/// `release` wakes every waiter registered at that point.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    set: Mutex<bool>,
    condvar: Condvar,
    notify: Notify,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, bool> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the signal has been released.
    pub fn is_set(&self) -> bool {
        *self.locked()
    }

    /// Mark the event as complete. Idempotent; repeated calls are no-ops.
    pub fn release(&self) {
        {
            let mut set = self.locked();
            if *set {
                return;
            }
            *set = true;
        }
        self.condvar.notify_all();
        self.notify.notify_waiters();
    }

    /// Block the calling thread until the signal is released.
    pub fn wait(&self) {
        let mut set = self.locked();
        while !*set {
            set = self
                .condvar
                .wait(set)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Suspend until the signal is released, without blocking the thread.
    pub async fn wait_async(&self) {
        loop {
            // Register interest before re-checking the flag so a release that
            // lands between the check and the await is not lost.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
