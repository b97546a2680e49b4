// src/transport/client.rs

//! The per-destination RPC session ("proxy" side of the wire contract).

use crate::error::HiveError;
use crate::message::Msg;
use crate::runtime::CmdReply;
use crate::transport::wire::{CmdEnvelope, CmdResultEnvelope, ConsensusMsg, HiveState};
use crate::transport::{
  build_url, CONTENT_TYPE_CONSENSUS, CONTENT_TYPE_ENVELOPE, SERVER_V1_CMD_PATH, SERVER_V1_CONSENSUS_PATH,
  SERVER_V1_MSG_PATH, SERVER_V1_STATE_PATH,
};

use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use url::Url;

/// Default cap on concurrent connections to one destination.
pub const DEFAULT_MAX_CONNS_PER_ADDR: usize = 64;

/// Connection-dialing knobs, consumed as an interface: one pooled HTTP
/// client per hive, capped per destination so a node cannot open unbounded
/// sockets as the number of remote-owned keys grows.
#[derive(Debug, Clone)]
pub struct Dialer {
  pub max_conns_per_addr: usize,
}

impl Default for Dialer {
  fn default() -> Self {
    Self {
      max_conns_per_addr: DEFAULT_MAX_CONNS_PER_ADDR,
    }
  }
}

impl Dialer {
  pub(crate) fn build_client(&self) -> Result<reqwest::Client, HiveError> {
    reqwest::Client::builder()
      .pool_max_idle_per_host(self.max_conns_per_addr)
      .build()
      .map_err(|e| HiveError::Transport(e.to_string()))
  }
}

/// An RPC session against one destination node: message delivery, command
/// execution, state fetch and consensus relay.
///
/// The session tracks consecutive failures: any transport error or non-2xx
/// response increments the counter, any 2xx resets it to zero. The counter
/// is a health signal for backoff policy layered above; no retry or backoff
/// happens here.
pub struct ProxyClient {
  to: String,
  state_url: String,
  msg_url: String,
  cmd_url: String,
  consensus_url: String,
  client: reqwest::Client,
  /// Callers needing a connection beyond the per-destination cap wait here.
  conns: Semaphore,
  errors: AtomicU64,
}

impl ProxyClient {
  pub(crate) fn new(client: reqwest::Client, addr: &str, max_conns: usize) -> Result<Self, HiveError> {
    Url::parse(&build_url("http", addr, "/")).map_err(|_| HiveError::InvalidAddress(addr.to_owned()))?;
    Ok(Self {
      to: addr.to_owned(),
      state_url: build_url("http", addr, SERVER_V1_STATE_PATH),
      msg_url: build_url("http", addr, SERVER_V1_MSG_PATH),
      cmd_url: build_url("http", addr, SERVER_V1_CMD_PATH),
      consensus_url: build_url("http", addr, SERVER_V1_CONSENSUS_PATH),
      client,
      conns: Semaphore::new(max_conns.max(1)),
      errors: AtomicU64::new(0),
    })
  }

  /// The destination address this session talks to.
  pub fn destination(&self) -> &str {
    &self.to
  }

  /// Consecutive failures since the last successful RPC.
  pub fn failures(&self) -> u64 {
    self.errors.load(Ordering::Relaxed)
  }

  fn record(&self, ok: bool) {
    if ok {
      self.errors.store(0, Ordering::Relaxed);
    } else {
      self.errors.fetch_add(1, Ordering::Relaxed);
    }
  }

  async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, HiveError> {
    self
      .conns
      .acquire()
      .await
      .map_err(|_| HiveError::Internal("connection cap semaphore closed".into()))
  }

  /// Delivers a message to the node hosting its owner. At-most-once: errors
  /// are surfaced, never retried here.
  pub async fn send_msg(&self, msg: &Msg) -> Result<(), HiveError> {
    let body = bincode::serialize(msg)?;
    let _permit = self.permit().await?;
    tracing::trace!(to = %self.to, ty = %msg.ty(), "proxy sends message");
    let res = self
      .client
      .post(&self.msg_url)
      .header(CONTENT_TYPE, CONTENT_TYPE_ENVELOPE)
      .body(body)
      .send()
      .await;
    match res {
      Err(e) => {
        self.record(false);
        Err(HiveError::Transport(e.to_string()))
      }
      Ok(res) if res.status().is_success() => {
        self.record(true);
        Ok(())
      }
      Ok(res) => {
        self.record(false);
        Err(HiveError::Remote(Self::body_text(res).await?))
      }
    }
  }

  /// Executes a command on the destination and decodes its result envelope.
  /// A non-2xx response carries the remote's error text verbatim.
  pub async fn send_cmd(&self, cmd: &CmdEnvelope) -> CmdReply {
    let body = bincode::serialize(cmd)?;
    let _permit = self.permit().await?;
    tracing::trace!(to = %self.to, cmd = ?cmd.data, "proxy sends command");
    let res = self
      .client
      .post(&self.cmd_url)
      .header(CONTENT_TYPE, CONTENT_TYPE_ENVELOPE)
      .body(body)
      .send()
      .await;
    match res {
      Err(e) => {
        self.record(false);
        Err(HiveError::Transport(e.to_string()))
      }
      Ok(res) if res.status().is_success() => {
        self.record(true);
        let bytes = res.bytes().await.map_err(|e| HiveError::Transport(e.to_string()))?;
        let envelope: CmdResultEnvelope = bincode::deserialize(&bytes)?;
        envelope.into_reply()
      }
      Ok(res) => {
        self.record(false);
        Err(HiveError::Remote(Self::body_text(res).await?))
      }
    }
  }

  /// Fetches the destination's state snapshot.
  pub async fn fetch_state(&self) -> Result<HiveState, HiveError> {
    let _permit = self.permit().await?;
    let res = self.client.get(&self.state_url).send().await;
    match res {
      Err(e) => {
        self.record(false);
        Err(HiveError::Transport(e.to_string()))
      }
      Ok(res) if res.status().is_success() => {
        self.record(true);
        let bytes = res.bytes().await.map_err(|e| HiveError::Transport(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
      }
      Ok(res) => {
        self.record(false);
        Err(HiveError::Remote(Self::body_text(res).await?))
      }
    }
  }

  /// Relays a node-level consensus message.
  pub async fn send_consensus(&self, msg: &ConsensusMsg) -> Result<(), HiveError> {
    let url = self.consensus_url.clone();
    self.post_consensus(&url, msg).await
  }

  /// Relays a consensus message for the group of one bee. The per-actor
  /// path keeps independent consensus groups free of cross-talk.
  pub async fn send_app_consensus(&self, app: &str, bee_id: u32, msg: &ConsensusMsg) -> Result<(), HiveError> {
    let url = format!("{}/{}/{}", self.consensus_url, app, bee_id);
    self.post_consensus(&url, msg).await
  }

  async fn post_consensus(&self, url: &str, msg: &ConsensusMsg) -> Result<(), HiveError> {
    let body = msg.encode()?;
    let _permit = self.permit().await?;
    tracing::trace!(to = %self.to, url, group = msg.group, "proxy relays consensus message");
    let res = self
      .client
      .post(url)
      .header(CONTENT_TYPE, CONTENT_TYPE_CONSENSUS)
      .body(body)
      .send()
      .await;
    match res {
      Err(e) => {
        self.record(false);
        Err(HiveError::Transport(e.to_string()))
      }
      Ok(res) if res.status().is_success() => {
        self.record(true);
        Ok(())
      }
      Ok(res) => {
        self.record(false);
        Err(HiveError::Remote(Self::body_text(res).await?))
      }
    }
  }

  async fn body_text(res: reqwest::Response) -> Result<String, HiveError> {
    res.text().await.map_err(|e| HiveError::Transport(e.to_string()))
  }
}

impl std::fmt::Debug for ProxyClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProxyClient")
      .field("to", &self.to)
      .field("failures", &self.failures())
      .finish_non_exhaustive()
  }
}

/// Per-hive cache of RPC sessions. All proxy bees addressing one
/// destination share a single session, and with it the pooled connections
/// and the per-destination cap.
#[derive(Clone)]
pub(crate) struct ProxyCache {
  client: reqwest::Client,
  max_conns: usize,
  sessions: Arc<RwLock<HashMap<String, Arc<ProxyClient>>>>,
}

impl ProxyCache {
  pub(crate) fn new(dialer: &Dialer) -> Result<Self, HiveError> {
    Ok(Self {
      client: dialer.build_client()?,
      max_conns: dialer.max_conns_per_addr,
      sessions: Arc::new(RwLock::new(HashMap::new())),
    })
  }

  pub(crate) fn get(&self, addr: &str) -> Result<Arc<ProxyClient>, HiveError> {
    if let Some(session) = self.sessions.read().get(addr) {
      return Ok(session.clone());
    }
    let mut sessions = self.sessions.write();
    // Double-check under the write lock: another caller may have won.
    if let Some(session) = sessions.get(addr) {
      return Ok(session.clone());
    }
    let session = Arc::new(ProxyClient::new(self.client.clone(), addr, self.max_conns)?);
    sessions.insert(addr.to_owned(), session.clone());
    Ok(session)
  }
}
