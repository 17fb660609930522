//! Ringkv Core - replication and consistency engine for a Dynamo-style key-value node
//!
//! A fixed-ring, leaderless key-value store using:
//! - SHA256 partitioning onto a fixed number of ring partitions
//! - preference lists of N replicas per key
//! - vector clocks, with concurrent writes kept as siblings
//! - a plain-text request/reply protocol between nodes

pub mod cluster;
pub mod error;
pub mod node;
pub mod object;
pub mod operations;
pub mod ring;
pub mod rpc;
pub mod storage;
pub mod vclock;

pub use cluster::{
    ClusterClient, Coordinator, INTERNAL_RPC_PATH, MemberState, MemberStatus, MembershipTable,
    PeerConfig, PeerDirectory, RemoteCoordinator, StaticCoordinator, Transport,
    UNREACHABLE_HEADER,
};
pub use error::{Result, RingError};
pub use node::{Node, NodeOptions};
pub use object::{SiblingSet, VersionedValue, decode_reply};
pub use operations::{
    Fanout, FanoutMode, GetValueOperation, GetValueOperationOutcome, GetValueOperationRequest,
    GetValueOperationResult, PeerReply, PutValueOperation, PutValueOperationRequest,
    PutValueOperationResult, reconcile,
};
pub use ring::{DEFAULT_PARTITIONS, HashRing, PartitionId};
pub use rpc::{RpcCommand, RpcReply, RpcRequest, dispatch};
pub use storage::{SiblingStore, SlotKey};
pub use vclock::{ClockOrdering, VectorClock};
