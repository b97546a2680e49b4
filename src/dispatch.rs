// src/dispatch.rs

//! Node-level message dispatch.
//!
//! One table maps message types to the (handler, mapper) pairs interested in
//! them; a second maps app names to their mappers for identity-targeted
//! deliveries. The dispatcher is a cheap, cloneable handle held by the hive
//! and by receive contexts, so emitting never needs a reference back to the
//! node.

use crate::app::Handler;
use crate::bee::ActorHandle;
use crate::error::HiveError;
use crate::message::{Msg, MsgAndHandler, MsgType};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
struct DispatchEntry {
  handler: Arc<dyn Handler>,
  mapper: ActorHandle,
}

struct DispatchInner {
  handlers: RwLock<HashMap<MsgType, Vec<DispatchEntry>>>,
  mappers: RwLock<HashMap<String, ActorHandle>>,
}

#[derive(Clone)]
pub(crate) struct Dispatcher {
  inner: Arc<DispatchInner>,
}

impl Dispatcher {
  pub(crate) fn new() -> Self {
    Self {
      inner: Arc::new(DispatchInner {
        handlers: RwLock::new(HashMap::new()),
        mappers: RwLock::new(HashMap::new()),
      }),
    }
  }

  pub(crate) fn register_handler(&self, ty: MsgType, handler: Arc<dyn Handler>, mapper: ActorHandle) {
    self
      .inner
      .handlers
      .write()
      .entry(ty)
      .or_default()
      .push(DispatchEntry { handler, mapper });
  }

  pub(crate) fn register_mapper(&self, app: String, mapper: ActorHandle) {
    self.inner.mappers.write().insert(app, mapper);
  }

  pub(crate) fn mapper_handles(&self) -> Vec<ActorHandle> {
    self.inner.mappers.read().values().cloned().collect()
  }

  /// Routes a message. Identity-targeted messages go straight to the owning
  /// app's mapper; everything else fans out to every app with a handler for
  /// the type. No handler means the message is dropped with a trace.
  pub(crate) async fn dispatch(&self, msg: Msg) -> Result<(), HiveError> {
    if !msg.to().is_nil() {
      let mapper = self.inner.mappers.read().get(&msg.to().app).cloned();
      return match mapper {
        Some(m) => {
          m.enqueue(MsgAndHandler { msg, handler: None }).await
        }
        None => {
          tracing::trace!(to = %msg.to(), "no app hosts the target bee, message dropped");
          Ok(())
        }
      };
    }

    let entries = self.inner.handlers.read().get(msg.ty()).cloned().unwrap_or_default();
    if entries.is_empty() {
      tracing::trace!(ty = %msg.ty(), "no handler registered, message dropped");
      return Ok(());
    }

    let mut first_err = None;
    for entry in entries {
      let mh = MsgAndHandler {
        msg: msg.clone(),
        handler: Some(entry.handler.clone()),
      };
      if let Err(e) = entry.mapper.enqueue(mh).await {
        tracing::warn!(ty = %msg.ty(), error = %e, "mapper rejected message");
        first_err.get_or_insert(e);
      }
    }
    match first_err {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}
