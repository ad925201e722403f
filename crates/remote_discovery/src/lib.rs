//! Multicast discovery of remote frameworks: UDP announcements, HTTP pull of
//! endpoint descriptions, framework liveness.

pub mod client;
pub mod discovery;
pub mod error;
pub mod frameworks;
pub mod http_client;
pub mod multicast;
pub mod packet;

pub use client::{MockPeerClient, PeerClient};
pub use discovery::{DiscoveryConfig, DiscoveryState, MulticastDiscovery};
pub use error::DiscoveryError;
pub use frameworks::{FrameworkDirectory, FrameworkEntry, FrameworkState};
pub use http_client::HttpPeerClient;
pub use packet::{Access, DiscoveryPacket, PacketEvent};
