use crate::routing::PeerKey;
use bytes::Bytes;
use std::net::SocketAddr;

/// One datagram travelling through a receive or send queue.
///
/// Inbound records carry what an endpoint read from its socket; outbound
/// records carry what a session handler wants sent back. Either way the
/// peer address and its derived [`PeerKey`] travel with the payload.
#[derive(Debug, Clone)]
pub struct PacketRecord {
    payload: Bytes,
    peer: SocketAddr,
    key: PeerKey,
}

impl PacketRecord {
    pub fn new(peer: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            key: PeerKey::from_addr(&peer),
            peer,
        }
    }

    /// Copy `data` out of a receive buffer.
    pub fn copy_from(peer: SocketAddr, data: &[u8]) -> Self {
        Self::new(peer, Bytes::copy_from_slice(data))
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[inline]
    pub fn key(&self) -> &PeerKey {
        &self.key
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
