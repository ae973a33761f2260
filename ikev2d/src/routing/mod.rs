//! Peer routing.
//!
//! Every datagram is routed to a session by a [`PeerKey`] derived purely from
//! its source address: `"<ip>-<port>"`, with the IP in its canonical textual
//! form (dotted quad for IPv4, compressed notation for IPv6). The same string
//! keys the session table, so the key is the only routing state the daemon
//! keeps.

pub mod peer_key;

pub use peer_key::PeerKey;
