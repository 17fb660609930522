//! Collaborators outside the replication engine: the request/reply
//! transport between nodes, peer address resolution and membership.

pub mod client;
pub mod coordinator;
pub mod peers;
pub mod transport;

pub use client::{ClusterClient, INTERNAL_RPC_PATH, UNREACHABLE_HEADER};
pub use coordinator::{
    Coordinator, MemberState, MemberStatus, MembershipTable, RemoteCoordinator, StaticCoordinator,
};
pub use peers::{PeerConfig, PeerDirectory};
pub use transport::Transport;
