use std::{fmt, net::SocketAddr, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Remote address reported for dynamic tunnels, which have no fixed destination.
pub const SOCKS_PROXY_LABEL: &str = "SOCKS5 proxy";

/// Opaque unique identifier of a tunnel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(Uuid);

impl TunnelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TunnelId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelKind {
    /// Fixed destination (`-L`).
    LocalForward,
    /// SOCKS5 proxy with per-connection destinations (`-D`).
    DynamicForward,
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelKind::LocalForward => f.write_str("local"),
            TunnelKind::DynamicForward => f.write_str("dynamic"),
        }
    }
}

/// Snapshot of a registered tunnel. Never carries the owned resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelInfo {
    pub id: TunnelId,
    /// Host profile alias the tunnel was opened against.
    pub alias: String,
    pub kind: TunnelKind,
    /// Address the local listener is actually bound to.
    pub local_addr: SocketAddr,
    /// `host:port` for local forwards, [`SOCKS_PROXY_LABEL`] for dynamic ones.
    pub remote_addr: String,
}

/// Fire-and-forget registry change notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum TunnelEvent {
    Opened(TunnelId),
    Closed(TunnelId),
}

impl TunnelEvent {
    pub fn tunnel_id(&self) -> TunnelId {
        match self {
            TunnelEvent::Opened(id) | TunnelEvent::Closed(id) => *id,
        }
    }
}
