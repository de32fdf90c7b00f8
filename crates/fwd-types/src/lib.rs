//! Shared type definitions for sshfwd
//!
//! This crate contains lightweight type definitions that are shared between
//! the tunnel engine, the SSH client glue, and the command line front end.

pub mod forward;
pub mod tunnel;

pub use forward::{DynamicSocksForward, LocalTcpForward};
pub use tunnel::{SOCKS_PROXY_LABEL, TunnelEvent, TunnelId, TunnelInfo, TunnelKind};
