// src/message.rs

//! Message types and actor identity.

use crate::app::Handler;
use crate::error::HiveError;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Globally unique identity of a bee across the cluster.
///
/// The all-empty/zero value is the *nil identity*: a sentinel meaning
/// "no bee". It is not an error value. Callers that can receive a nil
/// identity (e.g. key resolution) must check [`BeeId::is_nil`] explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeeId {
  /// Name of the hive hosting the bee.
  pub hive: String,
  /// Name of the app the bee belongs to.
  pub app: String,
  /// Per-app numeric id.
  pub id: u32,
}

impl BeeId {
  pub fn new(hive: impl Into<String>, app: impl Into<String>, id: u32) -> Self {
    Self {
      hive: hive.into(),
      app: app.into(),
      id,
    }
  }

  /// The sentinel "no bee" identity.
  pub fn nil() -> Self {
    Self::default()
  }

  /// True only when every field is empty/zero. An id of 0 with a non-empty
  /// hive or app name is a real identity, not nil.
  pub fn is_nil(&self) -> bool {
    self.hive.is_empty() && self.app.is_empty() && self.id == 0
  }
}

impl fmt::Display for BeeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.app, self.hive, self.id)
  }
}

/// Stable string tag identifying a message type.
///
/// Tags come from one of two places: an explicit tag chosen by the caller
/// ([`MsgType::from`]) or the canonical path of the payload's declared Rust
/// type ([`MsgType::of`]). Either way the tag is fixed at registration time;
/// there is no runtime type inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgType(String);

impl MsgType {
  /// Tag derived from the canonical path of `T`.
  pub fn of<T: ?Sized>() -> Self {
    MsgType(std::any::type_name::<T>().to_owned())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for MsgType {
  fn from(s: &str) -> Self {
    MsgType(s.to_owned())
  }
}

impl From<String> for MsgType {
  fn from(s: String) -> Self {
    MsgType(s)
  }
}

impl fmt::Display for MsgType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A key into an app's state dictionaries. Ownership of a key pins every
/// message mapped to it to a single bee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DictKey {
  pub dict: String,
  pub key: String,
}

impl DictKey {
  pub fn new(dict: impl Into<String>, key: impl Into<String>) -> Self {
    Self {
      dict: dict.into(),
      key: key.into(),
    }
  }
}

impl fmt::Display for DictKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.dict, self.key)
  }
}

/// The set of dictionary keys a handler's map function pins a message to.
/// An empty set drops the message.
pub type MappedKeys = Vec<DictKey>;

/// A typed payload plus routing metadata. Immutable once dispatched; the
/// only field the runtime rewrites is the destination, which a proxy bee
/// stamps with its own identity before forwarding.
#[derive(Clone, Serialize, Deserialize)]
pub struct Msg {
  ty: MsgType,
  data: Bytes,
  from: BeeId,
  to: BeeId,
}

impl Msg {
  /// Builds a message whose tag is the canonical path of `T` and whose
  /// payload is the compact binary encoding of `value`.
  pub fn new<T: Serialize>(value: &T) -> Result<Self, HiveError> {
    Ok(Self {
      ty: MsgType::of::<T>(),
      data: Bytes::from(bincode::serialize(value)?),
      from: BeeId::nil(),
      to: BeeId::nil(),
    })
  }

  /// Builds a message with an explicit tag and raw payload bytes.
  pub fn with_tag(ty: impl Into<MsgType>, data: Bytes) -> Self {
    Self {
      ty: ty.into(),
      data,
      from: BeeId::nil(),
      to: BeeId::nil(),
    }
  }

  /// Decodes the payload as `T`.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HiveError> {
    Ok(bincode::deserialize(&self.data)?)
  }

  pub fn ty(&self) -> &MsgType {
    &self.ty
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn from(&self) -> &BeeId {
    &self.from
  }

  pub fn to(&self) -> &BeeId {
    &self.to
  }

  pub(crate) fn set_from(&mut self, from: BeeId) {
    self.from = from;
  }

  pub(crate) fn set_to(&mut self, to: BeeId) {
    self.to = to;
  }

  /// Returns the message addressed to `to`. Used for replies and other
  /// identity-targeted sends that bypass the map function.
  pub fn addressed_to(mut self, to: BeeId) -> Self {
    self.to = to;
    self
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("ty", &self.ty.as_str())
      .field("size", &self.data.len())
      .field("from", &self.from)
      .field("to", &self.to)
      .finish()
  }
}

/// A message bound to the handler responsible for it, fixed at enqueue time
/// so a mailbox loop never re-derives routing on dequeue. `handler` is
/// `None` only for deliveries targeted by identity (replies routed to a
/// detached handler's private mailbox).
#[derive(Clone)]
pub(crate) struct MsgAndHandler {
  pub(crate) msg: Msg,
  pub(crate) handler: Option<Arc<dyn Handler>>,
}

impl fmt::Debug for MsgAndHandler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MsgAndHandler")
      .field("msg", &self.msg)
      .field("handler", &self.handler.is_some())
      .finish()
  }
}
