// src/transport/mod.rs

//! The peer-to-peer transport contract: endpoint paths, wire envelopes and
//! the per-destination RPC client.

pub mod client;
pub mod wire;

/// Node state snapshot, GET, JSON body.
pub const SERVER_V1_STATE_PATH: &str = "/api/v1/hive/state";
/// Message delivery, POST, compact binary envelope.
pub const SERVER_V1_MSG_PATH: &str = "/api/v1/hive/msg";
/// Command execution, POST, compact binary envelope in and out.
pub const SERVER_V1_CMD_PATH: &str = "/api/v1/hive/cmd";
/// Consensus relay, POST, fixed binary schema. Node-level traffic POSTs the
/// bare path; per-actor consensus groups POST `{path}/{app}/{bee_id}` so
/// each bee (or shard) can run its own group without cross-talk.
pub const SERVER_V1_CONSENSUS_PATH: &str = "/api/v1/hive/consensus";

/// Content tag for bincode-encoded message/command envelopes.
pub const CONTENT_TYPE_ENVELOPE: &str = "application/x-bincode";
/// Content tag for the fixed-schema consensus frames.
pub const CONTENT_TYPE_CONSENSUS: &str = "application/x-apiary-consensus";

pub(crate) fn build_url(scheme: &str, addr: &str, path: &str) -> String {
  format!("{scheme}://{addr}{path}")
}
