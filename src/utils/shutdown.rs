//! One-way shutdown token shared by every loop and job.
//!
//! Setting the token also wakes threads sleeping in
//! [`ShutdownToken::sleep`], so poll intervals do not delay teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

struct Inner {
    requested: AtomicBool,
    /// Dropped on request; disconnects every receiver.
    wake_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

/// Cloneable shutdown flag with wake-up support.
#[derive(Clone)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    /// Create a token that has not been triggered.
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                wake_tx: Mutex::new(Some(tx)),
                wake_rx: rx,
            }),
        }
    }

    /// Request shutdown.
    ///
    /// Returns `true` only for the call that actually flipped the token.
    pub fn request(&self) -> bool {
        let first = !self.inner.requested.swap(true, Ordering::SeqCst);
        if first {
            match self.inner.wake_tx.lock() {
                Ok(mut tx) => drop(tx.take()),
                Err(poisoned) => drop(poisoned.into_inner().take()),
            }
        }
        first
    }

    /// Check if shutdown was requested.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Sleep for up to `duration`, returning early on shutdown.
    ///
    /// Returns `true` if shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        match self.inner.wake_rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => self.is_requested(),
            // Nothing is ever sent; any other outcome means disconnected.
            _ => true,
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("requested", &self.is_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_request_is_one_way() {
        let token = ShutdownToken::new();
        assert!(!token.is_requested());
        assert!(token.request());
        assert!(!token.request());
        assert!(token.is_requested());
    }

    #[test]
    fn test_sleep_times_out() {
        let token = ShutdownToken::new();
        assert!(!token.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn test_sleep_wakes_on_request() {
        let token = ShutdownToken::new();
        let t = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || t.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        token.request();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
