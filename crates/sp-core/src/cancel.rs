use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Hierarchical cancellation flag shared between a controller and the
/// long-running tasks it spawns.
///
/// Cancelling a token cancels every child derived from it; cancelling a
/// child leaves the parent untouched. Cloning shares the same flag.
///
/// # Example
/// ```
/// use sp_core::cancel::CancelToken;
/// let root = CancelToken::new();
/// let child = root.child();
/// assert!(!child.is_cancelled());
/// root.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Node>,
}

#[derive(Debug, Default)]
struct Node {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a token cancelled together with `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Node {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.inner
            .parent
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
    }

    /// Sleep `ticks` × `tick`, checking the flag before each tick.
    ///
    /// Returns `true` when the full wait elapsed, `false` as soon as a
    /// cancellation is observed (at most one tick late).
    #[must_use]
    pub fn sleep_ticks(&self, ticks: u64, tick: Duration) -> bool {
        self.sleep_ticks_with(ticks, tick, |_| {})
    }

    /// Like [`sleep_ticks`](Self::sleep_ticks), calling `on_tick` with the
    /// number of completed ticks after each one.
    pub fn sleep_ticks_with(&self, ticks: u64, tick: Duration, mut on_tick: impl FnMut(u64)) -> bool {
        for done in 0..ticks {
            if self.is_cancelled() {
                return false;
            }
            thread::sleep(tick);
            on_tick(done + 1);
        }
        !self.is_cancelled()
    }
}
