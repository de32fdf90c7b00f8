//! Forward request types produced by `-L` / `-D` parsing.

/// Local TCP forward specification (`-L`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTcpForward {
    /// Listen on all interfaces instead of loopback only.
    pub gateway: bool,
    /// Local bind port.
    pub bind_port: u16,
    /// Target host to reach through the tunnel.
    pub target_host: String,
    /// Target port to reach through the tunnel.
    pub target_port: u16,
}

/// Dynamic SOCKS proxy specification (`-D`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicSocksForward {
    /// Listen on all interfaces instead of loopback only.
    pub gateway: bool,
    /// Bind port for the SOCKS proxy.
    pub bind_port: u16,
}
