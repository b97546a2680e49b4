// src/bee/local.rs

use crate::bee::ActorHandle;
use crate::context::RecvContext;
use crate::error::HiveError;
use crate::message::{BeeId, MsgAndHandler};
use crate::runtime::{mailbox, CmdData, CmdOk, ControlCmd, DoneLatch, MailboxReceiver, WaitGroup, DEFAULT_CTRL_CAPACITY};

use std::ops::ControlFlow;

/// A bee executing handler logic in-process.
pub(crate) struct LocalBee {
  id: BeeId,
  data_rx: MailboxReceiver<MsgAndHandler>,
  ctrl_rx: MailboxReceiver<ControlCmd>,
  done: DoneLatch,
  ctx: RecvContext,
}

impl LocalBee {
  /// Creates the bee and spawns its task. Returns the handle the mapper
  /// stores in its tables.
  pub(crate) fn spawn(id: BeeId, ctx: RecvContext, data_capacity: usize, wg: WaitGroup) -> ActorHandle {
    let (data_tx, data_rx) = mailbox(data_capacity);
    let (ctrl_tx, ctrl_rx) = mailbox(DEFAULT_CTRL_CAPACITY);
    let done = DoneLatch::new();
    let handle = ActorHandle {
      id: id.clone(),
      data_tx,
      ctrl_tx,
      done: done.clone(),
    };
    let bee = LocalBee {
      id,
      data_rx,
      ctrl_rx,
      done,
      ctx,
    };
    wg.add(1);
    tokio::spawn(async move {
      bee.run_loop().await;
      wg.done();
    });
    handle
  }

  async fn run_loop(mut self) {
    tracing::debug!(bee = %self.id, "local bee started");
    loop {
      // Data and control are raced without `biased`: tokio::select! polls
      // ready branches in random order, so neither queue can starve the
      // other and no fixed priority exists between them. Per-key ordering
      // comes from this being a single task, not from queue priority.
      tokio::select! {
        d = self.data_rx.recv() => match d {
          Ok(mh) => self.handle_msg(mh).await,
          Err(_) => break,
        },
        c = self.ctrl_rx.recv() => match c {
          Ok(cmd) => {
            if self.handle_cmd(cmd).await.is_break() {
              break;
            }
          }
          Err(_) => break,
        },
      }
    }
    tracing::debug!(bee = %self.id, "local bee stopped");
  }

  async fn handle_msg(&mut self, mh: MsgAndHandler) {
    match mh.handler {
      Some(handler) => handler.recv(&mh.msg, &mut self.ctx).await,
      None => {
        tracing::error!(bee = %self.id, ty = %mh.msg.ty(), "targeted message without a handler dropped");
      }
    }
  }

  async fn handle_cmd(&mut self, cmd: ControlCmd) -> ControlFlow<()> {
    match cmd.data {
      CmdData::Start => {
        ControlCmd::respond(cmd.reply, Ok(CmdOk::None));
        ControlFlow::Continue(())
      }
      CmdData::Stop => {
        stop_queues(&self.data_rx, &self.ctrl_rx, &self.done);
        ControlCmd::respond(cmd.reply, Ok(CmdOk::None));
        ControlFlow::Break(())
      }
      other => {
        ControlCmd::respond(cmd.reply, Err(HiveError::UnsupportedCommand(other.variant_name())));
        ControlFlow::Continue(())
      }
    }
  }
}

/// The one termination path shared by every bee kind: close the data queue,
/// close the control queue, open the completion latch, in that order. Items
/// still queued on the data side are dropped, not drained.
pub(crate) fn stop_queues(data_rx: &MailboxReceiver<MsgAndHandler>, ctrl_rx: &MailboxReceiver<ControlCmd>, done: &DoneLatch) {
  data_rx.close();
  ctrl_rx.close();
  done.open();
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::Handler;
  use crate::context::{MapContext, RecvContext};
  use crate::dispatch::Dispatcher;
  use crate::message::{MappedKeys, Msg};
  use crate::state::AppState;

  use async_trait::async_trait;
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::Notify;
  use tokio::time::timeout;

  fn test_ctx() -> RecvContext {
    RecvContext::new(
      "hive-test".into(),
      "app-test".into(),
      BeeId::new("hive-test", "app-test", 1),
      AppState::new(),
      Dispatcher::new(),
    )
  }

  /// Handler that parks on a gate before finishing each message, recording
  /// how many messages it has fully processed.
  struct GatedHandler {
    gate: Arc<Notify>,
    processed: Arc<std::sync::atomic::AtomicUsize>,
  }

  #[async_trait]
  impl Handler for GatedHandler {
    fn map(&self, _msg: &Msg, _ctx: &MapContext) -> MappedKeys {
      Vec::new()
    }

    async fn recv(&self, _msg: &Msg, _ctx: &mut RecvContext) {
      self.gate.notified().await;
      self.processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
  }

  fn delivery(handler: &Arc<GatedHandler>) -> MsgAndHandler {
    MsgAndHandler {
      msg: Msg::new(&0u8).unwrap(),
      handler: Some(handler.clone() as Arc<dyn Handler>),
    }
  }

  #[tokio::test]
  async fn bounded_data_queue_blocks_when_full() {
    let wg = WaitGroup::new();
    let gate = Arc::new(Notify::new());
    let processed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let handler = Arc::new(GatedHandler {
      gate: gate.clone(),
      processed: processed.clone(),
    });

    let handle = LocalBee::spawn(BeeId::new("h", "a", 1), test_ctx(), 1, wg.clone());

    // First message is dequeued and parks inside the handler; the second
    // fills the capacity-1 queue.
    handle.enqueue(delivery(&handler)).await.unwrap();
    handle.enqueue(delivery(&handler)).await.unwrap();

    // The next enqueue must block until a consumer frees a slot.
    let blocked = handle.enqueue(delivery(&handler));
    assert!(
      timeout(Duration::from_millis(50), blocked).await.is_err(),
      "enqueue past capacity should block"
    );

    // Release the handler; the queue drains and a fresh enqueue goes
    // straight through. Notify in a loop so no parked recv misses a permit.
    let release = {
      let gate = gate.clone();
      tokio::spawn(async move {
        loop {
          gate.notify_waiters();
          tokio::time::sleep(Duration::from_millis(5)).await;
        }
      })
    };
    timeout(Duration::from_millis(500), handle.enqueue(delivery(&handler)))
      .await
      .expect("enqueue should succeed once the queue drains")
      .unwrap();

    handle.stop_and_wait().await;
    release.abort();
    assert!(processed.load(std::sync::atomic::Ordering::SeqCst) >= 1);
  }

  #[tokio::test]
  async fn stop_releases_all_waiters_and_fails_later_enqueues() {
    let wg = WaitGroup::new();
    let handle = LocalBee::spawn(BeeId::new("h", "a", 2), test_ctx(), 4, wg.clone());

    let mut waiters = Vec::new();
    for _ in 0..4 {
      let done = handle.done.clone();
      waiters.push(tokio::spawn(async move { done.wait().await }));
    }

    handle.send_cmd(ControlCmd::new(CmdData::Stop)).await.unwrap();

    for w in waiters {
      timeout(Duration::from_millis(200), w)
        .await
        .expect("completion latch should release every waiter")
        .unwrap();
    }

    // The data queue is closed: enqueue must fail, never silently succeed.
    let err = handle
      .enqueue(MsgAndHandler {
        msg: Msg::new(&0u8).unwrap(),
        handler: None,
      })
      .await
      .unwrap_err();
    assert!(matches!(err, HiveError::MailboxClosed));

    // All tasks are accounted for.
    timeout(Duration::from_millis(200), wg.wait())
      .await
      .expect("bee task should have exited");
  }

  /// No ordering is promised between queued data and a queued stop, so the
  /// exact number of messages processed before the stop wins the race is
  /// unspecified. What is guaranteed: once the completion latch opens,
  /// nothing queued is processed afterwards.
  #[tokio::test]
  async fn no_processing_after_latch_opens() {
    let wg = WaitGroup::new();
    let gate = Arc::new(Notify::new());
    let processed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let handler = Arc::new(GatedHandler {
      gate: gate.clone(),
      processed: processed.clone(),
    });

    let handle = LocalBee::spawn(BeeId::new("h", "a", 3), test_ctx(), 8, wg.clone());

    // Park the loop inside the first message, queue more behind it, then
    // queue the stop.
    handle.enqueue(delivery(&handler)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    for _ in 0..3 {
      handle.enqueue(delivery(&handler)).await.unwrap();
    }
    handle.send_cmd(ControlCmd::new(CmdData::Stop)).await.unwrap();

    // Keep releasing the gate so no parked recv can hold the loop hostage;
    // the stop wins the data/control race within a few iterations.
    let release = {
      let gate = gate.clone();
      tokio::spawn(async move {
        loop {
          gate.notify_waiters();
          tokio::time::sleep(Duration::from_millis(5)).await;
        }
      })
    };
    timeout(Duration::from_secs(2), handle.done.wait())
      .await
      .expect("stop should terminate the loop");
    release.abort();

    let at_latch = processed.load(std::sync::atomic::Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = processed.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(at_latch, after, "no message may be processed after the latch opens");
    assert!(after <= 4);
  }
}
