// src/runtime/command.rs

//! Control commands carried on actor control queues.

use crate::app::DetachedHandler;
use crate::error::HiveError;
use crate::message::{BeeId, DictKey};

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Successful result of a control command.
#[derive(Debug)]
pub enum CmdOk {
  /// The command completed with nothing to return.
  None,
  /// A bee identity. Key lookups answer with the owner, or the nil identity
  /// when the key has no owner yet; callers must check `is_nil` themselves.
  Bee(BeeId),
  /// Application-defined result bytes from an app command.
  Data(Bytes),
}

/// What lands on a command's reply channel: a success value or an error.
/// Errors reported by a remote node carry the remote's text verbatim.
pub type CmdReply = Result<CmdOk, HiveError>;

/// The tagged operation inside a control command.
///
/// `Start`/`Stop` are lifecycle operations every actor understands. The
/// remaining variants are understood by specific actors (the mapper, or the
/// remote peer an app command is forwarded to); an actor receiving a command
/// it does not implement answers the reply channel with an error.
pub enum CmdData {
  /// Acknowledge that the actor is running.
  Start,
  /// Terminate the actor: close the data queue, close the control queue,
  /// open the completion latch, in that order. Queued data is not drained.
  Stop,
  /// Mapper: stop the bee and remove it from both lookup tables once its
  /// completion latch has opened.
  StopBee { id: BeeId },
  /// Mapper: answer with the bee owning `key`, or the nil identity.
  LookupKey { key: DictKey },
  /// Mapper: route the inner command to the control queue of the bee with
  /// identity `id`, carrying the caller's reply channel along.
  ToBee { id: BeeId, data: Box<CmdData> },
  /// Mapper: install the app's single detached handler. Local-only; never
  /// crosses the wire.
  RegisterDetached { handler: Arc<dyn DetachedHandler> },
  /// Application-defined command, opaque to the runtime. Proxy bees forward
  /// these to the node hosting the real owner.
  App(Bytes),
}

impl CmdData {
  /// The variant's name, for logging.
  pub fn variant_name(&self) -> &'static str {
    match self {
      CmdData::Start => "Start",
      CmdData::Stop => "Stop",
      CmdData::StopBee { .. } => "StopBee",
      CmdData::LookupKey { .. } => "LookupKey",
      CmdData::ToBee { .. } => "ToBee",
      CmdData::RegisterDetached { .. } => "RegisterDetached",
      CmdData::App(_) => "App",
    }
  }
}

impl fmt::Debug for CmdData {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CmdData::StopBee { id } => write!(f, "StopBee({id})"),
      CmdData::LookupKey { key } => write!(f, "LookupKey({key})"),
      CmdData::ToBee { id, data } => write!(f, "ToBee({id}, {data:?})"),
      CmdData::App(data) => write!(f, "App({} bytes)", data.len()),
      other => f.write_str(other.variant_name()),
    }
  }
}

/// A control command plus an optional reply channel. The reply channel, when
/// present, receives exactly one [`CmdReply`].
pub struct ControlCmd {
  pub data: CmdData,
  pub reply: Option<oneshot::Sender<CmdReply>>,
}

impl fmt::Debug for ControlCmd {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ControlCmd")
      .field("data", &self.data)
      .field("reply", &self.reply.is_some())
      .finish()
  }
}

impl ControlCmd {
  /// A fire-and-forget command.
  pub fn new(data: CmdData) -> Self {
    Self { data, reply: None }
  }

  /// A command paired with a reply channel for request/reply use.
  pub fn with_reply(data: CmdData) -> (Self, oneshot::Receiver<CmdReply>) {
    let (tx, rx) = oneshot::channel();
    (
      Self {
        data,
        reply: Some(tx),
      },
      rx,
    )
  }

  /// Delivers `result` into the reply channel, if one was supplied.
  pub(crate) fn respond(reply: Option<oneshot::Sender<CmdReply>>, result: CmdReply) {
    if let Some(tx) = reply {
      if tx.send(result).is_err() {
        tracing::debug!("command reply receiver dropped before delivery");
      }
    }
  }
}
