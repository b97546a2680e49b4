// src/mapper.rs

//! The per-app mapper: resolves dictionary keys and identities to bees.
//!
//! The mapper is itself actor-shaped. Its two lookup tables are touched only
//! by its own task, and every structural change (bee creation, retirement,
//! detached registration) arrives through its queues, so key resolution is
//! never observed mid-update by a concurrent dispatch.
//!
//! Locality invariant: at any instant a dictionary key resolves to at most
//! one bee across the whole mapper. That is what lets delivery to one key be
//! treated as sequential while distinct keys run fully in parallel.

use crate::app::DetachedHandler;
use crate::bee::detached::DetachedBee;
use crate::bee::local::{stop_queues, LocalBee};
use crate::bee::proxy::ProxyBee;
use crate::bee::ActorHandle;
use crate::context::{MapContext, RecvContext};
use crate::dispatch::Dispatcher;
use crate::error::HiveError;
use crate::message::{BeeId, DictKey, MsgAndHandler};
use crate::placement::{Placement, PlacementDecision};
use crate::runtime::{mailbox, CmdData, CmdOk, ControlCmd, DoneLatch, MailboxReceiver, WaitGroup, DEFAULT_CTRL_CAPACITY};
use crate::state::AppState;
use crate::transport::client::ProxyCache;

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Everything a mapper needs at spawn time. No field points back at the
/// hive or the app object; names and cloneable handles only.
pub(crate) struct MapperConfig {
  pub hive: String,
  pub app: String,
  pub state: AppState,
  pub dispatch: Dispatcher,
  pub placement: Arc<dyn Placement>,
  pub proxies: ProxyCache,
  pub wg: WaitGroup,
  pub data_capacity: usize,
}

pub(crate) struct Mapper {
  hive: String,
  app: String,
  data_rx: MailboxReceiver<MsgAndHandler>,
  ctrl_rx: MailboxReceiver<ControlCmd>,
  done: DoneLatch,
  /// Key ownership. Values are identities into `bees`.
  keys: HashMap<DictKey, BeeId>,
  /// Live bees by identity, the detached bee included.
  bees: HashMap<BeeId, ActorHandle>,
  detached: Option<BeeId>,
  next_id: u32,
  map_ctx: MapContext,
  state: AppState,
  dispatch: Dispatcher,
  placement: Arc<dyn Placement>,
  proxies: ProxyCache,
  wg: WaitGroup,
  data_capacity: usize,
}

impl Mapper {
  pub(crate) fn spawn(cfg: MapperConfig) -> ActorHandle {
    let (data_tx, data_rx) = mailbox(cfg.data_capacity);
    let (ctrl_tx, ctrl_rx) = mailbox(DEFAULT_CTRL_CAPACITY);
    let done = DoneLatch::new();
    // The mapper itself carries the nil identity: it is not a bee.
    let handle = ActorHandle {
      id: BeeId::nil(),
      data_tx,
      ctrl_tx,
      done: done.clone(),
    };
    let mapper = Mapper {
      map_ctx: MapContext::new(cfg.hive.clone(), cfg.app.clone(), cfg.state.clone()),
      hive: cfg.hive,
      app: cfg.app,
      data_rx,
      ctrl_rx,
      done,
      keys: HashMap::new(),
      bees: HashMap::new(),
      detached: None,
      next_id: 0,
      state: cfg.state,
      dispatch: cfg.dispatch,
      placement: cfg.placement,
      proxies: cfg.proxies,
      wg: cfg.wg.clone(),
      data_capacity: cfg.data_capacity,
    };
    cfg.wg.add(1);
    tokio::spawn(async move {
      mapper.run_loop().await;
      cfg.wg.done();
    });
    handle
  }

  async fn run_loop(mut self) {
    tracing::debug!(hive = %self.hive, app = %self.app, "mapper started");
    loop {
      // Unordered-fair race between routing work and control, same contract
      // as every bee loop.
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
    tracing::debug!(hive = %self.hive, app = %self.app, "mapper stopped");
  }

  async fn handle_msg(&mut self, mh: MsgAndHandler) {
    // Identity-targeted deliveries (replies) bypass the map function.
    if !mh.msg.to().is_nil() {
      let to = mh.msg.to().clone();
      match self.bees.get(&to) {
        Some(bee) => {
          if let Err(e) = bee.enqueue(mh).await {
            tracing::warn!(app = %self.app, bee = %to, error = %e, "targeted delivery failed");
          }
        }
        None => tracing::trace!(app = %self.app, bee = %to, "no such bee, targeted message dropped"),
      }
      return;
    }

    let handler = match &mh.handler {
      Some(h) => h.clone(),
      None => {
        tracing::error!(app = %self.app, ty = %mh.msg.ty(), "unmapped message without a handler dropped");
        return;
      }
    };

    let keys = handler.map(&mh.msg, &self.map_ctx);
    if keys.is_empty() {
      tracing::trace!(app = %self.app, ty = %mh.msg.ty(), "message mapped to no keys, dropped");
      return;
    }

    // Any key in the set that already has an owner picks that bee;
    // otherwise placement decides where the fresh set lives.
    let owner = match keys.iter().find_map(|k| self.keys.get(k).cloned()) {
      Some(id) => id,
      None => match self.create_bee(&keys) {
        Ok(id) => id,
        Err(e) => {
          tracing::error!(app = %self.app, error = %e, "cannot create bee, message dropped");
          return;
        }
      },
    };
    // Unowned keys in the set are claimed for the owner; keys already owned
    // elsewhere are left alone (repartitioning is migration policy, not
    // routing).
    for key in keys {
      self.keys.entry(key).or_insert_with(|| owner.clone());
    }

    let bee = match self.bees.get(&owner) {
      Some(b) => b.clone(),
      None => {
        tracing::error!(app = %self.app, bee = %owner, "owner bee missing from table, message dropped");
        return;
      }
    };
    // This send blocks when the bee's data queue is full; backpressure
    // propagates to whoever emitted the message.
    if let Err(e) = bee.enqueue(mh).await {
      tracing::warn!(app = %self.app, bee = %owner, error = %e, "enqueue to owner failed");
    }
  }

  fn create_bee(&mut self, keys: &[DictKey]) -> Result<BeeId, HiveError> {
    match self.placement.place(&self.app, keys) {
      PlacementDecision::Local => {
        let id = self.next_bee_id();
        let ctx = RecvContext::new(
          self.hive.clone(),
          self.app.clone(),
          id.clone(),
          self.state.clone(),
          self.dispatch.clone(),
        );
        let handle = LocalBee::spawn(id.clone(), ctx, self.data_capacity, self.wg.clone());
        self.bees.insert(id.clone(), handle);
        tracing::debug!(app = %self.app, bee = %id, "local bee created");
        Ok(id)
      }
      PlacementDecision::Remote { addr, id } => {
        let client = self.proxies.get(&addr)?;
        let handle = ProxyBee::spawn(id.clone(), client, self.data_capacity, self.wg.clone());
        self.bees.insert(id.clone(), handle);
        tracing::debug!(app = %self.app, bee = %id, to = %addr, "proxy bee created");
        Ok(id)
      }
    }
  }

  fn next_bee_id(&mut self) -> BeeId {
    self.next_id += 1;
    BeeId::new(self.hive.clone(), self.app.clone(), self.next_id)
  }

  async fn handle_cmd(&mut self, cmd: ControlCmd) -> ControlFlow<()> {
    match cmd.data {
      CmdData::Start => {
        ControlCmd::respond(cmd.reply, Ok(CmdOk::None));
        ControlFlow::Continue(())
      }
      CmdData::Stop => {
        self.stop_all_bees().await;
        self.keys.clear();
        stop_queues(&self.data_rx, &self.ctrl_rx, &self.done);
        ControlCmd::respond(cmd.reply, Ok(CmdOk::None));
        ControlFlow::Break(())
      }
      CmdData::StopBee { id } => {
        let result = self.retire_bee(&id).await;
        ControlCmd::respond(cmd.reply, result);
        ControlFlow::Continue(())
      }
      CmdData::LookupKey { key } => {
        // Nil answers "no owner"; the caller checks, it is not an error.
        let owner = self.keys.get(&key).cloned().unwrap_or_else(BeeId::nil);
        ControlCmd::respond(cmd.reply, Ok(CmdOk::Bee(owner)));
        ControlFlow::Continue(())
      }
      CmdData::ToBee { id, data } => {
        match self.bees.get(&id) {
          Some(bee) => {
            let forwarded = ControlCmd {
              data: *data,
              reply: cmd.reply,
            };
            if let Err(e) = bee.send_cmd(forwarded).await {
              tracing::warn!(app = %self.app, bee = %id, error = %e, "command routing failed");
            }
          }
          None => ControlCmd::respond(cmd.reply, Err(HiveError::UnknownBee(id.to_string()))),
        }
        ControlFlow::Continue(())
      }
      CmdData::RegisterDetached { handler } => {
        let result = self.register_detached(handler);
        ControlCmd::respond(cmd.reply, result);
        ControlFlow::Continue(())
      }
      CmdData::App(_) => {
        ControlCmd::respond(cmd.reply, Err(HiveError::UnsupportedCommand("App")));
        ControlFlow::Continue(())
      }
    }
  }

  /// Stops one bee and removes it from both tables. Removal happens only
  /// after the bee's completion latch opens, and only here in the mapper
  /// task, so no dispatch can race a send against a closing queue.
  async fn retire_bee(&mut self, id: &BeeId) -> Result<CmdOk, HiveError> {
    let bee = self.bees.get(id).cloned().ok_or_else(|| HiveError::UnknownBee(id.to_string()))?;
    bee.stop_and_wait().await;
    self.bees.remove(id);
    self.keys.retain(|_, owner| owner != id);
    if self.detached.as_ref() == Some(id) {
      self.detached = None;
    }
    tracing::debug!(app = %self.app, bee = %id, "bee retired");
    Ok(CmdOk::None)
  }

  fn register_detached(&mut self, handler: Arc<dyn DetachedHandler>) -> Result<CmdOk, HiveError> {
    if self.detached.is_some() {
      return Err(HiveError::DuplicateDetached);
    }
    let id = self.next_bee_id();
    let ctx = RecvContext::new(
      self.hive.clone(),
      self.app.clone(),
      id.clone(),
      self.state.clone(),
      self.dispatch.clone(),
    );
    let handle = DetachedBee::spawn(id.clone(), handler, ctx, self.data_capacity, self.wg.clone());
    self.bees.insert(id.clone(), handle);
    self.detached = Some(id.clone());
    tracing::debug!(app = %self.app, bee = %id, "detached handler registered");
    Ok(CmdOk::Bee(id))
  }

  async fn stop_all_bees(&mut self) {
    let bees: Vec<ActorHandle> = self.bees.drain().map(|(_, b)| b).collect();
    self.detached = None;
    futures::future::join_all(bees.iter().map(|b| b.stop_and_wait())).await;
  }
}
