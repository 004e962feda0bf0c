//! Single-fulfillment slots.
//!
//! A slot is a value cell plus a guard: the terminal value is written at
//! most once, and every fulfilling call site checks the guard first. Ports
//! and messengers store the resolver side on the instance and release it on
//! disconnect so late internal calls cannot double-resolve.

use std::sync::Mutex;

use tokio::sync::watch;

/// One-shot promise cell observable by any number of waiters.
pub struct FulfillSlot<T: Clone> {
    tx: Mutex<Option<watch::Sender<Option<T>>>>,
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> FulfillSlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Write the terminal value. Returns false when the slot was already
    /// fulfilled or its resolver released.
    pub fn fulfill(&self, value: T) -> bool {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match tx {
            Some(tx) => {
                // The value is retained by the channel even with no waiters.
                let _ = tx.send(Some(value));
                true
            }
            None => false,
        }
    }

    /// Drop the resolver without a value. Later fulfills become no-ops and
    /// pending waiters never complete.
    pub fn release(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }

    /// Current value, if fulfilled.
    pub fn peek(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the terminal value. Never completes when the resolver was
    /// released unfulfilled.
    pub async fn wait(&self) -> T {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            if rx.changed().await.is_err() {
                // Resolver released: left unresolved by design.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl<T: Clone> Default for FulfillSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
