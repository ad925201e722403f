use std::net::IpAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot resolve multicast group {group}: {source}")]
    Resolve {
        group: String,
        source: std::io::Error,
    },
    #[error("{0} is not a multicast address")]
    NotMulticast(IpAddr),
    #[error("cannot open multicast socket: {0}")]
    Bind(#[source] std::io::Error),
    #[error("discovery is already running")]
    AlreadyRunning,
    #[error("discovery was stopped while starting")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
