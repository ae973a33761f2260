use serde::{Deserialize, Serialize};

/// Receive buffer per endpoint; longer datagrams are truncated to this size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1024;

/// Largest payload a UDP datagram can carry over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default number of endpoints bound per address family.
pub const DEFAULT_ENDPOINTS_PER_FAMILY: usize = 6;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetIoConfig {
    /// Number of endpoints (independent sockets, each with a receive and a
    /// send loop) started per address family.
    #[serde(default = "default_endpoints_per_family")]
    pub endpoints_per_family: usize,

    /// Bytes read per datagram. Anything beyond is cut off by the kernel.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,

    /// Enable SO_REUSEPORT so the endpoints of a family can share one port and
    /// have the kernel spread datagrams across them.
    ///
    /// Off by default: each endpoint binds its own socket with SO_REUSEADDR
    /// only, and the most recently bound socket receives unicast traffic.
    #[serde(default)]
    pub reuse_port: bool,

    /// Optional kernel receive buffer size (SO_RCVBUF).
    /// Larger buffers reduce packet loss under burst traffic.
    #[serde(default)]
    pub socket_recv_buffer_size: Option<usize>,

    /// Optional kernel send buffer size (SO_SNDBUF).
    #[serde(default)]
    pub socket_send_buffer_size: Option<usize>,
}

fn default_endpoints_per_family() -> usize {
    DEFAULT_ENDPOINTS_PER_FAMILY
}

fn default_recv_buffer_size() -> usize {
    DEFAULT_RECV_BUFFER_SIZE
}

impl Default for NetIoConfig {
    fn default() -> Self {
        Self {
            endpoints_per_family: DEFAULT_ENDPOINTS_PER_FAMILY,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            reuse_port: false,
            socket_recv_buffer_size: None,
            socket_send_buffer_size: None,
        }
    }
}

impl NetIoConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.endpoints_per_family == 0 {
            errors.push("netio.endpoints_per_family must be > 0".to_string());
        }
        if self.endpoints_per_family > 256 {
            errors.push("netio.endpoints_per_family is unreasonably high (> 256)".to_string());
        }
        if self.recv_buffer_size == 0 {
            errors.push("netio.recv_buffer_size must be > 0".to_string());
        }
        if self.recv_buffer_size > MAX_UDP_PAYLOAD {
            errors.push(format!(
                "netio.recv_buffer_size ({}) exceeds the maximum UDP payload ({})",
                self.recv_buffer_size, MAX_UDP_PAYLOAD
            ));
        }
        if let Some(size) = self.socket_recv_buffer_size {
            if size < 4096 {
                errors.push("netio.socket_recv_buffer_size too small (< 4 KB)".to_string());
            }
        }
        if let Some(size) = self.socket_send_buffer_size {
            if size < 4096 {
                errors.push("netio.socket_send_buffer_size too small (< 4 KB)".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
