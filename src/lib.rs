//! apiary - a distributed actor runtime.
//!
//! A node ([`Hive`]) hosts named applications ([`App`]). Each app partitions
//! incoming messages across keyed bees using its handlers' map functions;
//! a bee is either a local executor or a proxy forwarding to the node that
//! owns the key, giving one addressable actor space across the cluster.
//! Placement, replication and leadership live in an external consensus
//! subsystem whose protocol messages this runtime only relays.

pub mod app;
pub mod context;
pub mod error;
pub mod hive;
pub mod message;
pub mod placement;
pub mod runtime;
pub mod state;
pub mod transport;

mod bee;
mod dispatch;
mod mapper;

pub use app::{App, DetachedHandler, Handler};
pub use context::{MapContext, RecvContext};
pub use error::HiveError;
pub use hive::{Hive, HiveConfig, Lifecycle};
pub use message::{BeeId, DictKey, MappedKeys, Msg, MsgType};
pub use placement::{LocalPlacement, Placement, PlacementDecision};
pub use runtime::{CmdData, CmdOk, CmdReply, ControlCmd};
pub use state::AppState;
pub use transport::client::{Dialer, ProxyClient, DEFAULT_MAX_CONNS_PER_ADDR};
pub use transport::wire::{CmdEnvelope, CmdResultEnvelope, ConsensusMsg, HiveState, WireCmdData};
