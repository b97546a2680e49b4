use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A broadcast-once completion signal.
///
/// The latch starts closed and is opened exactly once, on an actor's
/// termination path. Opening it releases every current waiter at the same
/// time; later waiters return immediately. No value is ever sent through it.
#[derive(Debug, Clone)]
pub(crate) struct DoneLatch {
  open: Arc<AtomicBool>,
  notify: Arc<Notify>,
}

impl DoneLatch {
  pub fn new() -> Self {
    Self {
      open: Arc::new(AtomicBool::new(false)),
      notify: Arc::new(Notify::new()),
    }
  }

  /// Opens the latch, releasing all waiters. Idempotent.
  pub fn open(&self) {
    // AcqRel pairs with the Acquire loads in wait().
    if !self.open.swap(true, Ordering::AcqRel) {
      self.notify.notify_waiters();
    }
  }

  /// Waits until the latch is opened. Returns immediately if it already is.
  pub async fn wait(&self) {
    loop {
      if self.open.load(Ordering::Acquire) {
        return;
      }
      let notified = self.notify.notified();
      // Re-check after registering: open() may have fired in between, and
      // notify_waiters() only wakes already-registered waiters.
      if self.open.load(Ordering::Acquire) {
        return;
      }
      notified.await;
    }
  }

  #[allow(dead_code)]
  pub fn is_open(&self) -> bool {
    self.open.load(Ordering::Acquire)
  }
}
