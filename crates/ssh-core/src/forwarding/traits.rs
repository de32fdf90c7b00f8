use async_trait::async_trait;
use russh::client;
use secrecy::SecretString;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::session::SshSession;

// Internal Result type alias for convenience
type Result<T> = crate::SshResult<T>;

/// Trait for streams that can be used for forwarding.
pub trait ForwardStreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ForwardStreamIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type alias for boxed forward streams.
pub type ForwardStream = Box<dyn ForwardStreamIo>;

/// Trait for sessions that can open forwarding connections.
///
/// Clones share one underlying session; channel opening must be safe from any
/// number of tasks at once.
#[async_trait]
pub trait ForwardSession: Clone + Send + Sync + 'static {
    async fn open_direct_tcpip(
        &self,
        target_host: String,
        target_port: u16,
        origin_host: String,
        origin_port: u16,
    ) -> Result<ForwardStream>;

    /// Resolves once the session has ended, whatever the reason.
    async fn closed(&self);

    /// Tear the session down, invalidating every channel opened from it.
    async fn close(&self) -> Result<()>;
}

/// Resolves host aliases and opens sessions for the tunnel manager.
///
/// `resolve` failures (`HostNotFound`, `PasswordRequired`, `AuthFailed`,
/// `HostKeyUnverified`) are handed to the caller unchanged, as are the typed
/// variants `dial` reports; other transport failures surface as `Dial`.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Target: Send + 'static;
    type Session: ForwardSession;

    async fn resolve(&self, alias: &str, credential: Option<&SecretString>) -> Result<Self::Target>;

    async fn dial(&self, target: Self::Target) -> Result<Self::Session>;
}

// Trait implementations for russh types

#[async_trait]
impl<H> ForwardSession for SshSession<H>
where
    H: client::Handler + Send + Sync + 'static,
{
    async fn open_direct_tcpip(
        &self,
        target_host: String,
        target_port: u16,
        origin_host: String,
        origin_port: u16,
    ) -> Result<ForwardStream> {
        let channel = self
            .handle()
            .channel_open_direct_tcpip(target_host, target_port.into(), origin_host, origin_port.into())
            .await?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn closed(&self) {
        self.closed_signal().fired().await
    }

    async fn close(&self) -> Result<()> {
        self.disconnect().await
    }
}
