// src/placement.rs

use crate::message::{BeeId, DictKey};

/// Where a freshly-claimed key set should live.
#[derive(Debug, Clone)]
pub enum PlacementDecision {
  /// Own the keys here; the mapper spawns a local bee with the next id.
  Local,
  /// The keys are owned by `id` on the node at `addr`; the mapper spawns a
  /// proxy bee that forwards there.
  Remote { addr: String, id: BeeId },
}

/// Decides ownership for key sets that have no owner yet. Placement policy
/// itself (and any migration or replication built on it) lives outside this
/// runtime; the default keeps everything local.
pub trait Placement: Send + Sync {
  fn place(&self, app: &str, keys: &[DictKey]) -> PlacementDecision;
}

/// Every key is owned by the local node.
#[derive(Debug, Default)]
pub struct LocalPlacement;

impl Placement for LocalPlacement {
  fn place(&self, _app: &str, _keys: &[DictKey]) -> PlacementDecision {
    PlacementDecision::Local
  }
}
