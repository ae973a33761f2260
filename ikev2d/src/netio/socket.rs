//! UDP socket creation for network endpoints.
//!
//! Sockets are built with socket2 so options can be applied before `bind`:
//! - SO_REUSEADDR always, so several endpoints (and quick restarts) can bind
//!   the same port
//! - SO_REUSEPORT when configured, for kernel load distribution
//! - optional SO_RCVBUF / SO_SNDBUF sizing
//! - IPV6_V6ONLY on IPv6 sockets, since each address family has its own
//!   endpoints and queues
//!
//! The socket stays in blocking mode: the receive loop reads with
//! `MSG_DONTWAIT` after readiness, and the send loop blocks in `send_to`.

use crate::error::{Error, Result};
use crate::netio::config::NetIoConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;

/// Create, configure and bind a UDP socket.
pub fn create_udp_socket(bind_addr: SocketAddr, config: &NetIoConfig) -> Result<Socket> {
    let domain = match bind_addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if config.reuse_port {
        socket.set_reuse_port(true)?;
    }

    if let Some(size) = config.socket_recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.socket_send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }

    if bind_addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|source| Error::Bind {
            addr: bind_addr,
            source,
        })?;

    Ok(socket)
}
