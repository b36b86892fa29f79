//! helix-p2p
//!
//! libp2p networking layer for Helix nodes, implementing the peer wire
//! protocol of the core's external interface.
//!
//! GossipSub broadcasts new DAG blocks, transactions and votes. A
//! request/response protocol answers the point-to-point `Get*` queries
//! (DAG blocks by hash or level range, PBFT blocks by period, next-vote
//! carry-over sets). Kademlia handles peer discovery; identify and ping
//! maintain connection liveness.

pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod network;
pub mod sync;

pub use config::P2pConfig;
pub use error::P2pError;
pub use message::{DagBlockWithTxs, PbftBlockWithVotes, StatusPayload, WireMessage};
pub use network::{InboundEvent, OutboundCommand, P2pHandle, P2pNetwork};
pub use sync::{verify_certified_header, SyncDriver, SyncError};
