// src/runtime/waitgroup.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// An asynchronous wait group tracking live actor tasks.
///
/// Every spawned mailbox loop registers itself (`add`) and signals
/// completion on exit (`done`). The hive's stop path waits until the count
/// returns to zero before declaring the node stopped.
#[derive(Debug, Clone)]
pub(crate) struct WaitGroup {
  count: Arc<AtomicUsize>,
  notify_on_zero: Arc<Notify>,
}

impl WaitGroup {
  pub fn new() -> Self {
    Self {
      count: Arc::new(AtomicUsize::new(0)),
      notify_on_zero: Arc::new(Notify::new()),
    }
  }

  /// Adds a delta to the counter. Called with 1 when spawning a task.
  pub fn add(&self, delta: usize) {
    if delta == 0 {
      return;
    }
    self.count.fetch_add(delta, Ordering::Relaxed);
  }

  /// Decrements the counter by one; at zero, all waiters are notified.
  ///
  /// Panics if the counter would drop below zero: that is a spawn/exit
  /// accounting bug, not a runtime condition.
  pub fn done(&self) {
    // AcqRel pairs with the Acquire loads in wait().
    let old_count = self.count.fetch_sub(1, Ordering::AcqRel);
    match old_count {
      0 => {
        self.count.fetch_add(1, Ordering::Relaxed);
        panic!("WaitGroup::done() called when count was already zero");
      }
      1 => self.notify_on_zero.notify_waiters(),
      _ => {}
    }
  }

  /// Waits until the counter is zero. Returns immediately if it already is.
  pub async fn wait(&self) {
    loop {
      if self.count.load(Ordering::Acquire) == 0 {
        return;
      }
      let notified = self.notify_on_zero.notified();
      // Re-check after registering; notify_waiters() only reaches waiters
      // that are already parked.
      if self.count.load(Ordering::Acquire) == 0 {
        return;
      }
      notified.await;
    }
  }

  #[allow(dead_code)]
  pub fn get_count(&self) -> usize {
    self.count.load(Ordering::Relaxed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::time::timeout;

  #[tokio::test]
  async fn wait_blocks_until_all_done() {
    let wg = WaitGroup::new();
    wg.add(2);

    let wg_wait = wg.clone();
    let mut wait_task = tokio::spawn(async move { wg_wait.wait().await });

    wg.done();
    assert!(
      timeout(Duration::from_millis(20), &mut wait_task).await.is_err(),
      "wait should still block with one task outstanding"
    );

    wg.done();
    timeout(Duration::from_millis(100), wait_task)
      .await
      .expect("wait should complete once count reaches zero")
      .unwrap();
    assert_eq!(wg.get_count(), 0);
  }

  #[tokio::test]
  async fn wait_on_zero_returns_immediately() {
    let wg = WaitGroup::new();
    timeout(Duration::from_millis(10), wg.wait())
      .await
      .expect("wait on an idle group should not block");
  }

  #[tokio::test]
  #[should_panic]
  async fn done_on_zero_panics() {
    let wg = WaitGroup::new();
    wg.done();
  }
}
