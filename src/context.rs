// src/context.rs

//! Contexts handed to handlers.
//!
//! Contexts carry names, the app's state handle and a dispatch handle; they
//! never hold a live reference back to the hive or the app object, so no
//! reference cycles exist among node, app, mapper and bees.

use crate::dispatch::Dispatcher;
use crate::error::HiveError;
use crate::message::{BeeId, Msg};
use crate::state::AppState;

use serde::Serialize;

/// Read-side context passed to a handler's map function.
#[derive(Clone)]
pub struct MapContext {
  hive: String,
  app: String,
  state: AppState,
}

impl MapContext {
  pub(crate) fn new(hive: String, app: String, state: AppState) -> Self {
    Self { hive, app, state }
  }

  pub fn hive_name(&self) -> &str {
    &self.hive
  }

  pub fn app_name(&self) -> &str {
    &self.app
  }

  pub fn state(&self) -> &AppState {
    &self.state
  }
}

/// Context passed to a handler's receive function and to detached handlers.
/// Reads and writes go through [`AppState`]; emitted messages re-enter the
/// node's dispatch path.
#[derive(Clone)]
pub struct RecvContext {
  hive: String,
  app: String,
  bee: BeeId,
  state: AppState,
  dispatch: Dispatcher,
}

impl RecvContext {
  pub(crate) fn new(hive: String, app: String, bee: BeeId, state: AppState, dispatch: Dispatcher) -> Self {
    Self {
      hive,
      app,
      bee,
      state,
      dispatch,
    }
  }

  pub fn hive_name(&self) -> &str {
    &self.hive
  }

  pub fn app_name(&self) -> &str {
    &self.app
  }

  /// Identity of the bee this context belongs to.
  pub fn bee(&self) -> &BeeId {
    &self.bee
  }

  pub fn state(&self) -> &AppState {
    &self.state
  }

  /// Emits a new message into the node's dispatch path. The message is
  /// stamped as coming from this bee and routed by type and map function.
  pub async fn emit<T: Serialize>(&self, value: &T) -> Result<(), HiveError> {
    let mut msg = Msg::new(value)?;
    msg.set_from(self.bee.clone());
    self.dispatch.dispatch(msg).await
  }

  /// Emits a prebuilt message, stamped as coming from this bee.
  pub async fn emit_msg(&self, mut msg: Msg) -> Result<(), HiveError> {
    msg.set_from(self.bee.clone());
    self.dispatch.dispatch(msg).await
  }

  /// Replies to the sender of `to_msg`. Targeted by identity, bypassing the
  /// map function; this is how detached handlers receive their replies.
  pub async fn reply<T: Serialize>(&self, to_msg: &Msg, value: &T) -> Result<(), HiveError> {
    let sender = to_msg.from();
    if sender.is_nil() {
      return Err(HiveError::InvalidState("cannot reply: message has no sender"));
    }
    let mut msg = Msg::new(value)?;
    msg.set_from(self.bee.clone());
    msg.set_to(sender.clone());
    self.dispatch.dispatch(msg).await
  }
}
