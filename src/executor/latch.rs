//! Settle-once completion cell
//!
//! Each running task owns one [`CompletionLatch`]. The task's own completion
//! path and its timeout timer both try to settle it; whichever gets there
//! first wins and every later attempt is refused. Waiters are woken once the
//! latch settles.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

enum Slot<T> {
    Open,
    Settled(T),
    Taken,
}

/// Single-assignment cell safe under concurrent writers
pub struct CompletionLatch<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

impl<T> CompletionLatch<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Open),
            notify: Notify::new(),
        }
    }

    /// Store `value` if nothing has been stored yet
    ///
    /// Returns `false` and drops `value` when the latch already settled.
    pub fn settle(&self, value: T) -> bool {
        let mut slot = self.lock();
        if !matches!(*slot, Slot::Open) {
            return false;
        }
        *slot = Slot::Settled(value);
        drop(slot);
        self.notify.notify_waiters();
        true
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.lock(), Slot::Open)
    }

    /// Wait until some writer settles the latch
    pub async fn wait(&self) {
        loop {
            // Register before checking so a settle in between is not missed.
            let notified = self.notify.notified();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }

    /// Move the settled value out. `None` while open or once taken.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Settled(value) => Some(value),
            Slot::Open => {
                *slot = Slot::Open;
                None
            }
            Slot::Taken => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for CompletionLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}
