use std::{io, net::SocketAddr, sync::Arc};

use fwd_types::TunnelId;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use super::{
    local::handle_local_tcp_connection,
    socks::handle_socks_client,
    traits::ForwardSession,
    tunnel::{Registry, TunnelTarget},
};
use crate::signal::ShutdownSignal;

/// Listening socket that another task can close while an accept is pending.
///
/// Firing `closed` makes the pending and every later `accept` fail; the
/// socket itself is released when the listener is dropped.
pub(super) struct TunnelListener {
    listener: TcpListener,
    closed: ShutdownSignal,
}

impl TunnelListener {
    pub fn new(listener: TcpListener, closed: ShutdownSignal) -> Self {
        Self { listener, closed }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        tokio::select! {
            biased;
            _ = self.closed.fired() => Err(io::Error::new(io::ErrorKind::NotConnected, "listener closed")),
            accepted = self.listener.accept() => accepted,
        }
    }
}

pub(super) struct Acceptor<S> {
    pub id: TunnelId,
    pub listener: TunnelListener,
    pub target: TunnelTarget,
    pub session: S,
    pub cancel: ShutdownSignal,
    pub registry: Arc<Registry<S>>,
}

/// Accept and dispatch connections until the listener fails, then clean up.
///
/// A failure after the cancellation signal fired is the unblocker closing the
/// listener and counts as a graceful stop; any other failure is fatal to the
/// tunnel. Either way the tunnel goes through the same cleanup.
pub(super) async fn run_acceptor<S>(acceptor: Acceptor<S>)
where
    S: ForwardSession,
{
    let Acceptor {
        id,
        listener,
        target,
        session,
        cancel,
        registry,
    } = acceptor;
    let unblocker = tokio::spawn(run_unblocker(id, cancel.clone(), listener.closed.clone()));

    loop {
        match listener.accept().await {
            Ok((stream, origin)) => {
                stream.set_nodelay(true).ok();
                debug!(tunnel = %id, origin = %origin, "accepted forward connection");
                let session = session.clone();
                match &target {
                    TunnelTarget::Fixed { host, port } => {
                        let (host, port) = (host.clone(), *port);
                        tokio::spawn(async move { handle_local_tcp_connection(stream, origin, &host, port, session).await });
                    }
                    TunnelTarget::Socks => {
                        tokio::spawn(handle_socks_client(stream, origin, session));
                    }
                }
            }
            Err(err) => {
                if cancel.is_fired() {
                    info!(tunnel = %id, "tunnel listener closed; stopping");
                } else {
                    error!(?err, tunnel = %id, "tunnel listener accept failed; shutting tunnel down");
                }
                break;
            }
        }
    }

    drop(listener);
    registry.cleanup(id).await;
    if let Err(err) = unblocker.await {
        debug!(?err, tunnel = %id, "unblocker task ended abnormally");
    }
}

/// Close the tunnel's listener once cancellation is requested.
async fn run_unblocker(id: TunnelId, cancel: ShutdownSignal, listener_closed: ShutdownSignal) {
    cancel.fired().await;
    if listener_closed.fire() {
        debug!(tunnel = %id, "closed tunnel listener");
    }
}
