use super::handler::SessionHandler;
use crate::netio::PacketRecord;
use crate::routing::PeerKey;
use crate::timer::EventId;
use parking_lot::{Mutex, MutexGuard};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// The expiry timer currently armed for a session.
#[derive(Debug, Default)]
pub(crate) struct ExpiryState {
    pub(crate) event: Option<EventId>,
    /// Bumped on every re-arm; a firing timer acts only if its generation is
    /// still current.
    pub(crate) generation: u64,
}

/// Per-peer state, created on the first datagram from a peer and dropped
/// when its expiry timer fires or the daemon shuts down.
#[derive(Debug)]
pub struct Session {
    key: PeerKey,
    peer: SocketAddr,
    packets: AtomicU64,
    /// Serialises handler calls for this peer.
    processing: Mutex<()>,
    expiry: Mutex<ExpiryState>,
}

impl Session {
    pub fn new(key: PeerKey, peer: SocketAddr) -> Self {
        Self {
            key,
            peer,
            packets: AtomicU64::new(0),
            processing: Mutex::new(()),
            expiry: Mutex::new(ExpiryState::default()),
        }
    }

    pub fn key(&self) -> &PeerKey {
        &self.key
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Datagrams processed so far.
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Run `handler` on one payload and address its output to this peer.
    pub fn process(&self, handler: &dyn SessionHandler, payload: &[u8]) -> Vec<PacketRecord> {
        let _serial = self.processing.lock();
        self.packets.fetch_add(1, Ordering::Relaxed);
        handler
            .handle(&self.key, payload)
            .into_iter()
            .map(|reply| PacketRecord::new(self.peer, reply))
            .collect()
    }

    pub fn expiry_event(&self) -> Option<EventId> {
        self.expiry.lock().event
    }

    pub(crate) fn expiry_state(&self) -> MutexGuard<'_, ExpiryState> {
        self.expiry.lock()
    }
}
