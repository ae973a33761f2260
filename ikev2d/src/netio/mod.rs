//! Network I/O.
//!
//! - [`Endpoint`]: one UDP socket plus its receive and send loops, generic over
//!   an [`AddressFamily`] ([`Ipv4`] or [`Ipv6`])
//! - [`PacketRecord`]: a datagram with its peer address and key
//! - socket creation and the network I/O configuration
//!
//! Session dispatch lives in the `session` module.

pub mod config;
pub mod endpoint;
pub mod family;
pub mod packet;
pub(crate) mod socket;

pub use config::NetIoConfig;
pub use endpoint::{Endpoint, EndpointControl, EndpointQueues, PacketQueue};
pub use family::{AddressFamily, Family, Ipv4, Ipv6};
pub use packet::PacketRecord;
