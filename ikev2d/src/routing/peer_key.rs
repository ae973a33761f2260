use std::borrow::Borrow;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Session key for one remote transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey(String);

impl PeerKey {
    #[inline]
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(format!("{}-{}", addr.ip(), addr.port()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the address the key was derived from.
    ///
    /// Splits on the last `-`, which never occurs inside an IP literal.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let (ip, port) = self.0.rsplit_once('-')?;
        let ip: IpAddr = ip.parse().ok()?;
        let port: u16 = port.parse().ok()?;
        Some(SocketAddr::new(ip, port))
    }
}

impl From<SocketAddr> for PeerKey {
    fn from(addr: SocketAddr) -> Self {
        Self::from_addr(&addr)
    }
}

impl From<&SocketAddr> for PeerKey {
    fn from(addr: &SocketAddr) -> Self {
        Self::from_addr(addr)
    }
}

impl FromStr for PeerKey {
    type Err = String;

    /// Accepts only canonical keys, i.e. strings `from_addr` could produce.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let candidate = Self(s.to_string());
        match candidate.to_socket_addr() {
            Some(addr) if Self::from_addr(&addr) == candidate => Ok(candidate),
            _ => Err(format!("Invalid peer key: {}", s)),
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PeerKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
