// src/hive.rs

//! The hive: a node hosting apps and their bees.

use crate::app::App;
use crate::dispatch::Dispatcher;
use crate::error::HiveError;
use crate::mapper::{Mapper, MapperConfig};
use crate::message::Msg;
use crate::placement::{LocalPlacement, Placement};
use crate::runtime::{DoneLatch, WaitGroup, DEFAULT_DATA_CAPACITY};
use crate::state::AppState;
use crate::transport::client::{Dialer, ProxyCache, ProxyClient};
use crate::transport::wire::{ConsensusMsg, HiveState};

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Node configuration. Flag/file parsing lives outside the runtime; this is
/// the already-parsed result.
#[derive(Debug, Clone)]
pub struct HiveConfig {
  /// Name of this node, part of every bee identity it mints.
  pub name: String,
  /// Address this node advertises to its peers.
  pub addr: String,
  /// Bound of every actor's data queue; a full queue blocks the sender.
  pub data_capacity: usize,
  /// Connection-pool knobs for outbound RPC sessions.
  pub dialer: Dialer,
}

impl Default for HiveConfig {
  fn default() -> Self {
    Self {
      name: "hive".to_owned(),
      addr: "127.0.0.1:7767".to_owned(),
      data_capacity: DEFAULT_DATA_CAPACITY,
      dialer: Dialer::default(),
    }
  }
}

/// Process-lifecycle states. The machine has one path:
/// `Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Running,
  Stopping,
  Stopped,
}

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

struct HiveInner {
  config: HiveConfig,
  dispatch: Dispatcher,
  apps: RwLock<HashMap<String, App>>,
  proxies: ProxyCache,
  lifecycle: AtomicU8,
  wg: WaitGroup,
  stopped: DoneLatch,
}

/// Handle to a node. Cloneable (`Arc`-based); all clones address the same
/// node.
#[derive(Clone)]
pub struct Hive {
  inner: Arc<HiveInner>,
}

impl Hive {
  pub fn new(config: HiveConfig) -> Result<Self, HiveError> {
    let proxies = ProxyCache::new(&config.dialer)?;
    tracing::info!(hive = %config.name, addr = %config.addr, "hive created");
    Ok(Self {
      inner: Arc::new(HiveInner {
        config,
        dispatch: Dispatcher::new(),
        apps: RwLock::new(HashMap::new()),
        proxies,
        lifecycle: AtomicU8::new(RUNNING),
        wg: WaitGroup::new(),
        stopped: DoneLatch::new(),
      }),
    })
  }

  pub fn name(&self) -> &str {
    &self.inner.config.name
  }

  pub fn addr(&self) -> &str {
    &self.inner.config.addr
  }

  pub fn lifecycle(&self) -> Lifecycle {
    match self.inner.lifecycle.load(Ordering::Acquire) {
      RUNNING => Lifecycle::Running,
      STOPPING => Lifecycle::Stopping,
      _ => Lifecycle::Stopped,
    }
  }

  /// Creates an app with the default (all-local) placement.
  pub fn new_app(&self, name: &str) -> Result<App, HiveError> {
    self.new_app_with_placement(name, Arc::new(LocalPlacement))
  }

  /// Creates an app whose fresh keys are placed by `placement`. The app's
  /// mapper is spawned here, before the `App` handle is handed out, so
  /// handler registration can never observe a missing mapper.
  pub fn new_app_with_placement(&self, name: &str, placement: Arc<dyn Placement>) -> Result<App, HiveError> {
    if self.lifecycle() != Lifecycle::Running {
      return Err(HiveError::InvalidState("hive is not running"));
    }
    let mut apps = self.inner.apps.write();
    if apps.contains_key(name) {
      return Err(HiveError::DuplicateApp(name.to_owned()));
    }

    let state = AppState::new();
    let app = App::new(
      name.to_owned(),
      self.inner.config.name.clone(),
      state.clone(),
      self.inner.dispatch.clone(),
    );
    let mapper = Mapper::spawn(MapperConfig {
      hive: self.inner.config.name.clone(),
      app: name.to_owned(),
      state,
      dispatch: self.inner.dispatch.clone(),
      placement,
      proxies: self.inner.proxies.clone(),
      wg: self.inner.wg.clone(),
      data_capacity: self.inner.config.data_capacity,
    });
    app.attach_mapper(mapper.clone());
    self.inner.dispatch.register_mapper(name.to_owned(), mapper);
    apps.insert(name.to_owned(), app.clone());
    tracing::info!(hive = %self.inner.config.name, app = %name, "app registered");
    Ok(app)
  }

  /// Emits a message into the node: it is routed to every app with a
  /// handler for its type, keyed by each app's map function.
  pub async fn emit<T: Serialize>(&self, value: &T) -> Result<(), HiveError> {
    self.emit_msg(Msg::new(value)?).await
  }

  pub async fn emit_msg(&self, msg: Msg) -> Result<(), HiveError> {
    if self.lifecycle() != Lifecycle::Running {
      return Err(HiveError::InvalidState("hive is not running"));
    }
    self.inner.dispatch.dispatch(msg).await
  }

  /// The RPC session for `addr`, shared with every proxy bee addressing the
  /// same destination.
  pub fn proxy(&self, addr: &str) -> Result<Arc<ProxyClient>, HiveError> {
    self.inner.proxies.get(addr)
  }

  /// Relays a node-level consensus message to the node at `addr`.
  pub async fn send_consensus(&self, addr: &str, msg: &ConsensusMsg) -> Result<(), HiveError> {
    self.proxy(addr)?.send_consensus(msg).await
  }

  /// Relays a consensus message for one bee's group to the node at `addr`.
  pub async fn send_app_consensus(&self, addr: &str, app: &str, bee_id: u32, msg: &ConsensusMsg) -> Result<(), HiveError> {
    self.proxy(addr)?.send_app_consensus(app, bee_id, msg).await
  }

  /// The snapshot served on the state endpoint.
  pub fn state_snapshot(&self) -> HiveState {
    HiveState {
      hive: self.inner.config.name.clone(),
      addr: self.inner.config.addr.clone(),
      apps: self.inner.apps.read().keys().cloned().collect(),
    }
  }

  /// Runs the node until it is stopped: installs the signal watcher and
  /// waits for the stop sequence to finish.
  pub async fn run(&self) -> Result<(), HiveError> {
    self.spawn_signal_watcher();
    self.inner.stopped.wait().await;
    Ok(())
  }

  /// The unified stop sequence. Idempotent: the first caller drives the
  /// `Running -> Stopping` transition, later callers return immediately.
  /// Stops every mapper (each stops its bees first), then waits for all
  /// actor tasks to account for themselves.
  pub async fn stop(&self) -> Result<(), HiveError> {
    if self
      .inner
      .lifecycle
      .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::debug!(hive = %self.inner.config.name, "stop already initiated");
      return Ok(());
    }
    tracing::info!(hive = %self.inner.config.name, "hive stopping");

    let mappers = self.inner.dispatch.mapper_handles();
    futures::future::join_all(mappers.iter().map(|m| m.stop_and_wait())).await;

    // Every spawned mailbox loop decrements the wait group on exit; the
    // timeout guards against a task wedged in application code.
    let quiesce = Duration::from_secs(10);
    if tokio::time::timeout(quiesce, self.inner.wg.wait()).await.is_err() {
      tracing::error!(
        hive = %self.inner.config.name,
        outstanding = self.inner.wg.get_count(),
        "actor tasks did not quiesce within {:?}",
        quiesce
      );
    }

    self.inner.lifecycle.store(STOPPED, Ordering::Release);
    self.inner.stopped.open();
    tracing::info!(hive = %self.inner.config.name, "hive stopped");
    Ok(())
  }

  /// Watches for termination-class signals. The signals are not
  /// distinguished from one another: any of them triggers the one stop
  /// sequence.
  #[cfg(unix)]
  fn spawn_signal_watcher(&self) {
    use tokio::signal::unix::{signal, SignalKind};

    let hive = self.clone();
    tokio::spawn(async move {
      let mut streams = Vec::new();
      for kind in [
        SignalKind::hangup(),
        SignalKind::interrupt(),
        SignalKind::terminate(),
        SignalKind::quit(),
      ] {
        match signal(kind) {
          Ok(s) => streams.push(s),
          Err(e) => {
            tracing::error!(hive = %hive.name(), error = %e, "cannot install signal handler");
            return;
          }
        }
      }
      let wait_any = streams.iter_mut().map(|s| Box::pin(s.recv()));
      futures::future::select_all(wait_any).await;
      tracing::info!(hive = %hive.name(), "termination signal received");
      if let Err(e) = hive.stop().await {
        tracing::error!(hive = %hive.name(), error = %e, "stop sequence failed");
      }
    });
  }

  #[cfg(not(unix))]
  fn spawn_signal_watcher(&self) {
    let hive = self.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!(hive = %hive.name(), "termination signal received");
        if let Err(e) = hive.stop().await {
          tracing::error!(hive = %hive.name(), error = %e, "stop sequence failed");
        }
      }
    });
  }
}

impl std::fmt::Debug for Hive {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Hive")
      .field("name", &self.inner.config.name)
      .field("lifecycle", &self.lifecycle())
      .finish_non_exhaustive()
  }
}
