//! Multicast socket setup.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::{DiscoveryError, Result};

/// Resolves the group name to the first multicast address.
pub async fn resolve_group(group: &str, port: u16) -> Result<SocketAddr> {
    let addresses: Vec<SocketAddr> = tokio::net::lookup_host((group, port))
        .await
        .map_err(|source| DiscoveryError::Resolve {
            group: group.to_string(),
            source,
        })?
        .collect();

    match addresses.iter().find(|addr| addr.ip().is_multicast()) {
        Some(addr) => Ok(*addr),
        None => match addresses.first() {
            Some(addr) => Err(DiscoveryError::NotMulticast(addr.ip())),
            None => Err(DiscoveryError::Resolve {
                group: group.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address"),
            }),
        },
    }
}

/// Binds the group port on every interface, with address reuse so several
/// frameworks on one host share it, and joins the group.
pub fn open_socket(group: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(group), Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::Bind)?;
    socket.set_reuse_address(true).map_err(DiscoveryError::Bind)?;

    match group.ip() {
        IpAddr::V4(ip) => {
            let local = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), group.port());
            socket.bind(&local.into()).map_err(DiscoveryError::Bind)?;
            socket
                .join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)
                .map_err(DiscoveryError::Bind)?;
            socket.set_multicast_loop_v4(true).map_err(DiscoveryError::Bind)?;
        }
        IpAddr::V6(ip) => {
            socket.set_only_v6(true).map_err(DiscoveryError::Bind)?;
            let local = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), group.port());
            socket.bind(&local.into()).map_err(DiscoveryError::Bind)?;
            socket.join_multicast_v6(&ip, 0).map_err(DiscoveryError::Bind)?;
            socket.set_multicast_loop_v6(true).map_err(DiscoveryError::Bind)?;
        }
    }

    socket.set_nonblocking(true).map_err(DiscoveryError::Bind)?;
    let socket = UdpSocket::from_std(socket.into()).map_err(DiscoveryError::Bind)?;
    debug!(%group, "joined multicast group");
    Ok(socket)
}

pub fn leave_group(socket: &UdpSocket, group: SocketAddr) {
    let result = match group.ip() {
        IpAddr::V4(ip) => socket.leave_multicast_v4(ip, Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(ip) => socket.leave_multicast_v6(&ip, 0),
    };
    if let Err(e) = result {
        warn!(%group, error = %e, "failed to leave multicast group");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_literal_group() {
        let addr = resolve_group("239.0.0.1", 42000).await.unwrap();
        assert_eq!(addr, "239.0.0.1:42000".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn unicast_group_is_rejected() {
        let err = resolve_group("127.0.0.1", 42000).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotMulticast(_)));
    }
}
