//! Peer configuration, liveness tracking, and outbound peer calls.

mod client;
mod config;
mod registry;

pub use client::{
    PeerClient, CHECKSUM_BUDGET, HELLO_BUDGET, QUERY_BUDGET, TRANSFER_BUDGET,
};
pub use config::{PeerConfig, PeerEntry, PeerProtocol, SelfConfig, PEERS_FILE};
pub use registry::{PeerLiveStatus, PeerRegistry, PeerState};
