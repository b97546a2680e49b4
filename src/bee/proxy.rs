// src/bee/proxy.rs

use crate::bee::ActorHandle;
use crate::bee::local::stop_queues;
use crate::message::{BeeId, MsgAndHandler};
use crate::runtime::{mailbox, CmdData, CmdOk, ControlCmd, DoneLatch, MailboxReceiver, WaitGroup, DEFAULT_CTRL_CAPACITY};
use crate::transport::client::ProxyClient;
use crate::transport::wire::{CmdEnvelope, WireCmdData};

use std::ops::ControlFlow;
use std::sync::Arc;

/// A bee standing in for a remotely-owned key. It has the same mailbox-loop
/// shape as a local bee, but business traffic is forwarded to the node
/// hosting the real owner instead of being executed here.
pub(crate) struct ProxyBee {
  /// Identity of the *remote* bee this proxy stands in for.
  id: BeeId,
  data_rx: MailboxReceiver<MsgAndHandler>,
  ctrl_rx: MailboxReceiver<ControlCmd>,
  done: DoneLatch,
  client: Arc<ProxyClient>,
}

impl ProxyBee {
  pub(crate) fn spawn(id: BeeId, client: Arc<ProxyClient>, data_capacity: usize, wg: WaitGroup) -> ActorHandle {
    let (data_tx, data_rx) = mailbox(data_capacity);
    let (ctrl_tx, ctrl_rx) = mailbox(DEFAULT_CTRL_CAPACITY);
    let done = DoneLatch::new();
    let handle = ActorHandle {
      id: id.clone(),
      data_tx,
      ctrl_tx,
      done: done.clone(),
    };
    let bee = ProxyBee {
      id,
      data_rx,
      ctrl_rx,
      done,
      client,
    };
    wg.add(1);
    tokio::spawn(async move {
      bee.run_loop().await;
      wg.done();
    });
    handle
  }

  async fn run_loop(mut self) {
    tracing::debug!(bee = %self.id, to = %self.client.destination(), "proxy bee started");
    loop {
      // Same unordered-fair race over data and control as a local bee.
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
    tracing::debug!(bee = %self.id, "proxy bee stopped");
  }

  /// Stamps the message with the owner's identity and forwards it. Delivery
  /// is at-most-once: a failed send is logged and the message dropped, with
  /// no retry at this layer.
  async fn handle_msg(&mut self, mh: MsgAndHandler) {
    let mut msg = mh.msg;
    msg.set_to(self.id.clone());
    if let Err(e) = self.client.send_msg(&msg).await {
      tracing::error!(bee = %self.id, to = %self.client.destination(), error = %e, "cannot forward message, dropped");
    }
  }

  /// Lifecycle commands are handled by the local machinery: a proxy manages
  /// its own task even though business logic lives remotely. Everything
  /// else is forwarded synchronously, so a slow peer stalls only this bee's
  /// queue, and the remote result lands in the caller's reply channel
  /// exactly once.
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
        let result = match WireCmdData::try_from(&other) {
          Ok(data) => {
            let envelope = CmdEnvelope {
              app: self.id.app.clone(),
              to: self.id.clone(),
              data,
            };
            self.client.send_cmd(&envelope).await
          }
          Err(e) => Err(e),
        };
        ControlCmd::respond(cmd.reply, result);
        ControlFlow::Continue(())
      }
    }
  }
}
