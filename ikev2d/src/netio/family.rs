//! Address-family capability used to specialise [`super::Endpoint`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::debug;

/// Runtime tag for an address family, used in logs and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "ipv4")]
    V4,
    #[serde(rename = "ipv6")]
    V6,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::V4 => Ipv4::NAME,
            Family::V6 => Ipv6::NAME,
        }
    }

    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Family::V4,
            SocketAddr::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an endpoint needs to know about its address family.
pub trait AddressFamily: Send + Sync + 'static {
    const FAMILY: Family;
    const NAME: &'static str;

    /// Whether `addr` belongs to this family.
    fn accepts(addr: &SocketAddr) -> bool;

    /// Resolve `host` and pick the first address of this family.
    fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        let candidates = match (host, port).to_socket_addrs() {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(family = Self::NAME, %host, error = %e, "Address resolution failed");
                return Err(Error::NoInterface {
                    family: Self::NAME,
                    host: host.to_string(),
                });
            }
        };

        candidates
            .into_iter()
            .find(Self::accepts)
            .ok_or_else(|| Error::NoInterface {
                family: Self::NAME,
                host: host.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ipv4;

#[derive(Debug, Clone, Copy)]
pub struct Ipv6;

impl AddressFamily for Ipv4 {
    const FAMILY: Family = Family::V4;
    const NAME: &'static str = "IPv4";

    fn accepts(addr: &SocketAddr) -> bool {
        addr.is_ipv4()
    }
}

impl AddressFamily for Ipv6 {
    const FAMILY: Family = Family::V6;
    const NAME: &'static str = "IPv6";

    fn accepts(addr: &SocketAddr) -> bool {
        addr.is_ipv6()
    }
}
