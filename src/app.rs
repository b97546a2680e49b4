// src/app.rs

//! Apps and their handler registry.
//!
//! Apps process and exchange messages. An app's map and receive functions
//! are called sequentially per key and are not assumed to be re-entrant for
//! a single key; cross-key calls run fully in parallel.

use crate::bee::ActorHandle;
use crate::context::{MapContext, RecvContext};
use crate::dispatch::Dispatcher;
use crate::error::HiveError;
use crate::message::{BeeId, DictKey, MappedKeys, Msg, MsgType};
use crate::runtime::{CmdData, CmdOk, ControlCmd};
use crate::state::AppState;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A message handler: `map` pins a message to a set of dictionary keys,
/// `recv` processes it on the bee owning those keys.
#[async_trait]
pub trait Handler: Send + Sync {
  /// Maps a message to the keys that determine ownership. Returning an
  /// empty set drops the message.
  fn map(&self, msg: &Msg, ctx: &MapContext) -> MappedKeys;

  /// Handles a message. Called sequentially for one key, in parallel across
  /// keys. Failures here are the app's responsibility, not the runtime's.
  async fn recv(&self, msg: &Msg, ctx: &mut RecvContext);
}

/// A handler that runs as its own long-lived task instead of being bound to
/// a message type. It emits messages and receives only replies to them, in
/// its private mailbox. Each app can have at most one.
#[async_trait]
pub trait DetachedHandler: Send + Sync {
  /// Runs the handler's own loop. May block for the bee's whole life.
  async fn start(&self, ctx: RecvContext);

  /// Stops the handler. This is the app's hook to unblock `start`, e.g.
  /// through a channel the app owns.
  async fn stop(&self, ctx: RecvContext);

  /// Receives a reply to a message this handler emitted.
  async fn recv(&self, msg: &Msg, ctx: &mut RecvContext);
}

/// Adapter turning a pair of plain functions into a [`Handler`].
struct FnHandler<M, R> {
  map_fn: M,
  recv_fn: R,
}

#[async_trait]
impl<M, R> Handler for FnHandler<M, R>
where
  M: Fn(&Msg, &MapContext) -> MappedKeys + Send + Sync,
  R: Fn(&Msg, &mut RecvContext) + Send + Sync,
{
  fn map(&self, msg: &Msg, ctx: &MapContext) -> MappedKeys {
    (self.map_fn)(msg, ctx)
  }

  async fn recv(&self, msg: &Msg, ctx: &mut RecvContext) {
    (self.recv_fn)(msg, ctx)
  }
}

pub(crate) struct AppShared {
  name: String,
  hive: String,
  sticky: AtomicBool,
  state: AppState,
  handlers: RwLock<HashMap<MsgType, Arc<dyn Handler>>>,
  /// Set once, when the hive spawns the app's mapper. Registration before
  /// this point is a setup-ordering bug.
  mapper: OnceCell<ActorHandle>,
  dispatch: Dispatcher,
}

/// Handle to an application hosted on a hive. Cloneable (`Arc`-based).
#[derive(Clone)]
pub struct App {
  inner: Arc<AppShared>,
}

impl std::fmt::Debug for App {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("App")
      .field("name", &self.inner.name)
      .field("hive", &self.inner.hive)
      .finish_non_exhaustive()
  }
}

impl App {
  pub(crate) fn new(name: String, hive: String, state: AppState, dispatch: Dispatcher) -> Self {
    Self {
      inner: Arc::new(AppShared {
        name,
        hive,
        sticky: AtomicBool::new(false),
        state,
        handlers: RwLock::new(HashMap::new()),
        mapper: OnceCell::new(),
        dispatch,
      }),
    }
  }

  pub(crate) fn attach_mapper(&self, mapper: ActorHandle) {
    if self.inner.mapper.set(mapper).is_err() {
      panic!("app {}: mapper attached twice", self.inner.name);
    }
  }

  fn mapper(&self) -> &ActorHandle {
    match self.inner.mapper.get() {
      Some(m) => m,
      // Setup order was violated; there is nothing sensible to recover to.
      None => panic!("app {}: used before its mapper was initialized", self.inner.name),
    }
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn hive_name(&self) -> &str {
    &self.inner.hive
  }

  /// Whether this app's bees must never be relocated. Carried for placement
  /// policies to honor; the runtime itself does not migrate bees.
  pub fn sticky(&self) -> bool {
    self.inner.sticky.load(Ordering::Relaxed)
  }

  pub fn set_sticky(&self, sticky: bool) {
    self.inner.sticky.store(sticky, Ordering::Relaxed);
  }

  /// The app's state dictionaries.
  pub fn state(&self) -> AppState {
    self.inner.state.clone()
  }

  /// Registers `handler` for messages whose tag is the canonical path of
  /// `T`. Fails if a handler for that type already exists; the first
  /// registration stays active.
  pub fn handle<T, H>(&self, handler: H) -> Result<(), HiveError>
  where
    H: Handler + 'static,
  {
    self.handle_tagged(MsgType::of::<T>(), handler)
  }

  /// Registers `handler` under an explicit type tag.
  pub fn handle_tagged(&self, ty: impl Into<MsgType>, handler: impl Handler + 'static) -> Result<(), HiveError> {
    let mapper = self.mapper().clone();
    let ty = ty.into();

    let mut handlers = self.inner.handlers.write();
    if handlers.contains_key(&ty) {
      return Err(HiveError::DuplicateHandler(ty.to_string()));
    }
    let handler: Arc<dyn Handler> = Arc::new(handler);
    handlers.insert(ty.clone(), handler.clone());
    // Install into the node dispatch table while still holding our lock, so
    // a racing duplicate registration cannot slip in between.
    self.inner.dispatch.register_handler(ty, handler, mapper);
    Ok(())
  }

  /// Registers a map/recv function pair for messages of type `T`.
  pub fn handle_fn<T, M, R>(&self, map_fn: M, recv_fn: R) -> Result<(), HiveError>
  where
    M: Fn(&Msg, &MapContext) -> MappedKeys + Send + Sync + 'static,
    R: Fn(&Msg, &mut RecvContext) + Send + Sync + 'static,
  {
    self.handle::<T, _>(FnHandler { map_fn, recv_fn })
  }

  /// Registers the app's single detached handler. Delegated to the mapper,
  /// which owns detached-bee lifecycle; a second registration is an error.
  pub async fn detached(&self, handler: impl DetachedHandler + 'static) -> Result<BeeId, HiveError> {
    let (cmd, rx) = ControlCmd::with_reply(CmdData::RegisterDetached {
      handler: Arc::new(handler),
    });
    self.mapper().send_cmd(cmd).await?;
    match rx.await {
      Ok(Ok(CmdOk::Bee(id))) => Ok(id),
      Ok(Ok(_)) => Err(HiveError::Internal("unexpected reply to detached registration".into())),
      Ok(Err(e)) => Err(e),
      Err(_) => Err(HiveError::NoReply),
    }
  }

  /// Resolves the bee currently owning `key`. Answers the nil identity when
  /// the key has no owner yet; check with [`BeeId::is_nil`].
  pub async fn resolve_key(&self, key: DictKey) -> Result<BeeId, HiveError> {
    let (cmd, rx) = ControlCmd::with_reply(CmdData::LookupKey { key });
    self.mapper().send_cmd(cmd).await?;
    match rx.await {
      Ok(Ok(CmdOk::Bee(id))) => Ok(id),
      Ok(Ok(_)) => Err(HiveError::Internal("unexpected reply to key lookup".into())),
      Ok(Err(e)) => Err(e),
      Err(_) => Err(HiveError::NoReply),
    }
  }

  /// Stops the bee with identity `id` and removes it from the mapper's
  /// tables once it has fully stopped.
  pub async fn stop_bee(&self, id: BeeId) -> Result<(), HiveError> {
    let (cmd, rx) = ControlCmd::with_reply(CmdData::StopBee { id });
    self.mapper().send_cmd(cmd).await?;
    match rx.await {
      Ok(Ok(_)) => Ok(()),
      Ok(Err(e)) => Err(e),
      Err(_) => Err(HiveError::NoReply),
    }
  }

  /// Sends an application-defined command to the bee with identity `id`.
  /// The mapper routes the command to the bee's control queue; if the bee is
  /// a proxy, the command is forwarded to the node hosting the real owner
  /// and the remote result (value or verbatim error) comes back here.
  pub async fn send_app_cmd(&self, id: BeeId, payload: bytes::Bytes) -> Result<Option<bytes::Bytes>, HiveError> {
    let (cmd, rx) = ControlCmd::with_reply(CmdData::ToBee {
      id,
      data: Box::new(CmdData::App(payload)),
    });
    self.mapper().send_cmd(cmd).await?;
    match rx.await {
      Ok(Ok(CmdOk::Data(data))) => Ok(Some(data)),
      Ok(Ok(_)) => Ok(None),
      Ok(Err(e)) => Err(e),
      Err(_) => Err(HiveError::NoReply),
    }
  }
}
