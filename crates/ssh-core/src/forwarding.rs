//! SSH port forwarding and dynamic SOCKS5 proxies.
//!
//! This module provides functionality for:
//! - Local TCP forwarding to a fixed destination
//! - Dynamic SOCKS5 proxies with per-connection destinations
//! - Tunnel lifecycle: registry, stop, and cleanup on upstream loss
//!
//! The main entry point is [`TunnelManager`], which owns every tunnel it
//! starts. Each tunnel runs an acceptor loop paired with an unblocker task
//! that closes the listener once the tunnel's cancellation signal fires, and a
//! health monitor that fires that signal when the SSH session ends.

mod acceptor;
mod copy;
mod local;
mod manager;
mod parsing;
mod socks;
mod traits;
mod tunnel;

// Re-export public API
pub use copy::{CopyTotals, copy_bidirectional_joined};
pub use manager::TunnelManager;
pub use parsing::{parse_dynamic_socks, parse_local_tcp};
pub use traits::{ForwardSession, ForwardStream, ForwardStreamIo, SessionConnector};
