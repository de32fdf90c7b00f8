use std::sync::Arc;

use russh::{
    Disconnect,
    client::{self, Handle},
};
use tracing::debug;

use crate::signal::ShutdownSignal;

pub type SessionHandle<H> = Handle<H>;
pub type SharedSessionHandle<H> = Arc<Handle<H>>;

/// An authenticated SSH session plus its liveness signal.
///
/// The `closed` signal must be fired by whoever observes the session ending;
/// the client handler does this when russh drops it at the end of the
/// connection task, and [`SshSession::disconnect`] does it on local close.
pub struct SshSession<H>
where
    H: client::Handler,
{
    handle: SharedSessionHandle<H>,
    closed: ShutdownSignal,
}

impl<H> Clone for SshSession<H>
where
    H: client::Handler,
{
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
            closed: self.closed.clone(),
        }
    }
}

impl<H> SshSession<H>
where
    H: client::Handler + Send,
{
    pub fn new(handle: SessionHandle<H>, closed: ShutdownSignal) -> Self {
        Self {
            handle: Arc::new(handle),
            closed,
        }
    }

    pub fn handle(&self) -> &SessionHandle<H> {
        self.handle.as_ref()
    }

    pub fn closed_signal(&self) -> &ShutdownSignal {
        &self.closed
    }

    /// Disconnect the session; every channel opened from it is torn down with it.
    pub async fn disconnect(&self) -> crate::SshResult<()> {
        let result = if self.handle.is_closed() {
            Ok(())
        } else {
            self.handle
                .disconnect(Disconnect::ByApplication, "tunnel closed", "en")
                .await
                .map_err(Into::into)
        };
        if self.closed.fire() {
            debug!("ssh session marked closed");
        }
        result
    }
}
