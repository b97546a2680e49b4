// src/bee/detached.rs

use crate::app::DetachedHandler;
use crate::bee::ActorHandle;
use crate::bee::local::stop_queues;
use crate::context::RecvContext;
use crate::error::HiveError;
use crate::message::{BeeId, MsgAndHandler};
use crate::runtime::{mailbox, CmdData, CmdOk, ControlCmd, DoneLatch, MailboxReceiver, WaitGroup, DEFAULT_CTRL_CAPACITY};

use std::ops::ControlFlow;
use std::sync::Arc;

/// Hosts an app's detached handler: a free-running task with a private reply
/// mailbox, supervised through the same queue/latch contract as every other
/// bee.
pub(crate) struct DetachedBee {
  id: BeeId,
  handler: Arc<dyn DetachedHandler>,
  data_rx: MailboxReceiver<MsgAndHandler>,
  ctrl_rx: MailboxReceiver<ControlCmd>,
  done: DoneLatch,
  ctx: RecvContext,
}

impl DetachedBee {
  pub(crate) fn spawn(
    id: BeeId,
    handler: Arc<dyn DetachedHandler>,
    ctx: RecvContext,
    data_capacity: usize,
    wg: WaitGroup,
  ) -> ActorHandle {
    let (data_tx, data_rx) = mailbox(data_capacity);
    let (ctrl_tx, ctrl_rx) = mailbox(DEFAULT_CTRL_CAPACITY);
    let done = DoneLatch::new();
    let handle = ActorHandle {
      id: id.clone(),
      data_tx,
      ctrl_tx,
      done: done.clone(),
    };

    // The handler's own loop runs as a separate task and may block for the
    // bee's whole life; stop(ctx) is the app's hook to unblock it.
    {
      let handler = handler.clone();
      let start_ctx = ctx.clone();
      let id = id.clone();
      tokio::spawn(async move {
        handler.start(start_ctx).await;
        tracing::debug!(bee = %id, "detached handler start() returned");
      });
    }

    let bee = DetachedBee {
      id,
      handler,
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
    tracing::debug!(bee = %self.id, "detached bee started");
    loop {
      tokio::select! {
        d = self.data_rx.recv() => match d {
          Ok(mh) => self.handle_reply(mh).await,
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
    tracing::debug!(bee = %self.id, "detached bee stopped");
  }

  /// A detached handler does not map general traffic; its data queue only
  /// ever carries replies to messages the handler emitted itself.
  async fn handle_reply(&mut self, mh: MsgAndHandler) {
    self.handler.recv(&mh.msg, &mut self.ctx).await;
  }

  async fn handle_cmd(&mut self, cmd: ControlCmd) -> ControlFlow<()> {
    match cmd.data {
      CmdData::Start => {
        ControlCmd::respond(cmd.reply, Ok(CmdOk::None));
        ControlFlow::Continue(())
      }
      CmdData::Stop => {
        // Give the handler its stop entry point before tearing down, then
        // run the standard termination path.
        self.handler.stop(self.ctx.clone()).await;
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
