use crate::routing::PeerKey;
use bytes::Bytes;

/// Protocol logic behind a session.
///
/// The dispatch core treats payloads as opaque bytes; whatever key exchange
/// or codec runs on top lives behind this trait. Calls for one session are
/// serialised; calls for different sessions may run concurrently.
pub trait SessionHandler: Send + Sync + 'static {
    /// Handle one inbound payload and return the payloads to send back to
    /// the same peer.
    fn handle(&self, key: &PeerKey, payload: &[u8]) -> Vec<Bytes>;

    /// Release handler-wide resources. Called once during daemon shutdown.
    fn release(&self) {}
}

impl<F> SessionHandler for F
where
    F: Fn(&PeerKey, &[u8]) -> Vec<Bytes> + Send + Sync + 'static,
{
    fn handle(&self, key: &PeerKey, payload: &[u8]) -> Vec<Bytes> {
        self(key, payload)
    }
}

/// Sends every payload straight back to its sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl SessionHandler for EchoHandler {
    fn handle(&self, _key: &PeerKey, payload: &[u8]) -> Vec<Bytes> {
        vec![Bytes::copy_from_slice(payload)]
    }
}
