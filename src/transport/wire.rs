// src/transport/wire.rs

//! Wire envelopes and the consensus frame codec.
//!
//! Two error regimes apply while decoding. Malformed or truncated input is
//! external (possibly hostile) data and comes back as `HiveError::Wire`. A
//! violation of the codec's own length accounting is an internal bug and
//! aborts; it must never be reported as a recoverable decode error.

use crate::error::HiveError;
use crate::message::{BeeId, DictKey};
use crate::runtime::{CmdData, CmdOk, CmdReply};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// The subset of control commands that may cross the wire. Local-only
/// commands (detached registration, bee routing) never leave the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireCmdData {
  Start,
  Stop,
  StopBee { id: BeeId },
  LookupKey { key: DictKey },
  App(Vec<u8>),
}

impl TryFrom<&CmdData> for WireCmdData {
  type Error = HiveError;

  fn try_from(data: &CmdData) -> Result<Self, HiveError> {
    match data {
      CmdData::Start => Ok(WireCmdData::Start),
      CmdData::Stop => Ok(WireCmdData::Stop),
      CmdData::StopBee { id } => Ok(WireCmdData::StopBee { id: id.clone() }),
      CmdData::LookupKey { key } => Ok(WireCmdData::LookupKey { key: key.clone() }),
      CmdData::App(bytes) => Ok(WireCmdData::App(bytes.to_vec())),
      other => Err(HiveError::UnsupportedCommand(other.variant_name())),
    }
  }
}

/// A command addressed to a bee on a remote node.
#[derive(Debug, Serialize, Deserialize)]
pub struct CmdEnvelope {
  pub app: String,
  pub to: BeeId,
  pub data: WireCmdData,
}

/// Result of a remotely-executed command: a success value or an error
/// string, surfaced verbatim on the caller's side.
#[derive(Debug, Serialize, Deserialize)]
pub struct CmdResultEnvelope {
  pub data: Option<Vec<u8>>,
  pub err: Option<String>,
}

impl CmdResultEnvelope {
  pub fn ok(data: Option<Vec<u8>>) -> Self {
    Self { data, err: None }
  }

  pub fn error(text: impl Into<String>) -> Self {
    Self {
      data: None,
      err: Some(text.into()),
    }
  }

  pub(crate) fn into_reply(self) -> CmdReply {
    match self.err {
      Some(text) => Err(HiveError::Remote(text)),
      None => Ok(match self.data {
        Some(d) => CmdOk::Data(Bytes::from(d)),
        None => CmdOk::None,
      }),
    }
  }
}

/// Node state snapshot served on the state endpoint, consumed by placement
/// and membership logic above this runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveState {
  pub hive: String,
  pub addr: String,
  pub apps: Vec<String>,
}

/// Fixed frame header: group, from, to (u64 each), kind (u8), payload
/// length (u32).
pub const CONSENSUS_HEADER_LEN: usize = 8 + 8 + 8 + 1 + 4;

/// A consensus-protocol message relayed between nodes. The runtime never
/// looks inside `data`; reliability is the consensus subsystem's own
/// responsibility, so no retry happens at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMsg {
  /// Consensus group the message belongs to. Groups may be scoped per
  /// app/bee rather than per node.
  pub group: u64,
  pub from: u64,
  pub to: u64,
  pub kind: u8,
  pub data: Bytes,
}

impl ConsensusMsg {
  /// Encodes the fixed binary frame.
  pub fn encode(&self) -> Result<Bytes, HiveError> {
    if self.data.len() > u32::MAX as usize {
      return Err(HiveError::Wire("consensus payload exceeds frame limit".into()));
    }
    let mut buf = BytesMut::with_capacity(CONSENSUS_HEADER_LEN + self.data.len());
    buf.put_u64(self.group);
    buf.put_u64(self.from);
    buf.put_u64(self.to);
    buf.put_u8(self.kind);
    buf.put_u32(self.data.len() as u32);
    buf.put_slice(&self.data);
    // Length accounting is internal bookkeeping: a mismatch here is a codec
    // bug and must abort, unlike malformed input on the decode side.
    assert_eq!(
      buf.len(),
      CONSENSUS_HEADER_LEN + self.data.len(),
      "consensus frame length accounting violated"
    );
    Ok(buf.freeze())
  }

  /// Decodes one frame. Truncated or malformed input is reported
  /// gracefully, never aborts.
  pub fn decode(buf: &mut impl Buf) -> Result<Self, HiveError> {
    if buf.remaining() < CONSENSUS_HEADER_LEN {
      return Err(HiveError::Wire("truncated consensus header".into()));
    }
    let group = buf.get_u64();
    let from = buf.get_u64();
    let to = buf.get_u64();
    let kind = buf.get_u8();
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
      return Err(HiveError::Wire("truncated consensus payload".into()));
    }
    let data = buf.copy_to_bytes(len);
    Ok(Self {
      group,
      from,
      to,
      kind,
      data,
    })
  }
}
