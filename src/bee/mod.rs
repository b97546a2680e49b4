// src/bee/mod.rs

//! Bees: the keyed units of concurrent execution.
//!
//! Every bee (and the mapper, which is actor-shaped) is built from the same
//! foundation: a bounded data queue, a bounded control queue, a completion
//! latch, and one spawned task that races the two queues. Local bees run
//! handler logic in-process; proxy bees forward to the node hosting the real
//! owner; detached bees host an app's free-running handler.

pub(crate) mod detached;
pub(crate) mod local;
pub(crate) mod proxy;

use crate::error::HiveError;
use crate::message::{BeeId, MsgAndHandler};
use crate::runtime::{CmdData, ControlCmd, DoneLatch, MailboxSender};

/// Handle to a spawned mailbox loop. The spawned task owns the receiving
/// ends; this handle is what the mapper's tables (and the hive, for mappers)
/// hold on to.
#[derive(Clone)]
pub(crate) struct ActorHandle {
  pub(crate) id: BeeId,
  pub(crate) data_tx: MailboxSender<MsgAndHandler>,
  pub(crate) ctrl_tx: MailboxSender<ControlCmd>,
  pub(crate) done: DoneLatch,
}

impl ActorHandle {
  /// Places work on the data queue. Awaits while the queue is full; that is
  /// the backpressure mechanism. Fails once the queue is closed: an enqueue
  /// after stop is an error, never a silent success.
  pub(crate) async fn enqueue(&self, mh: MsgAndHandler) -> Result<(), HiveError> {
    self.data_tx.send(mh).await.map_err(|_| HiveError::MailboxClosed)
  }

  /// Places a command on the control queue.
  pub(crate) async fn send_cmd(&self, cmd: ControlCmd) -> Result<(), HiveError> {
    self.ctrl_tx.send(cmd).await.map_err(|_| HiveError::MailboxClosed)
  }

  /// Asks the actor to stop and waits until its completion latch opens.
  /// Safe to call on an already-stopped actor.
  pub(crate) async fn stop_and_wait(&self) {
    let _ = self.ctrl_tx.send(ControlCmd::new(CmdData::Stop)).await;
    self.done.wait().await;
  }
}

impl std::fmt::Debug for ActorHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActorHandle").field("id", &self.id).finish_non_exhaustive()
  }
}
