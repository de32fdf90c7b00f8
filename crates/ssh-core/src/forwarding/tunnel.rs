use std::collections::HashMap;

use fwd_types::{TunnelEvent, TunnelId, TunnelInfo};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::traits::ForwardSession;
use crate::signal::ShutdownSignal;

const EVENT_CAPACITY: usize = 64;

/// Where accepted connections are sent.
#[derive(Clone, Debug)]
pub(super) enum TunnelTarget {
    Fixed { host: String, port: u16 },
    Socks,
}

/// A registered tunnel and the resources it exclusively owns.
pub(super) struct Tunnel<S> {
    pub info: TunnelInfo,
    pub session: S,
    /// Fired by `stop_forward` or the health monitor, whichever comes first.
    pub cancel: ShutdownSignal,
    /// Fired by the unblocker to close the listening socket.
    pub listener_closed: ShutdownSignal,
}

/// Tunnel registry shared by the manager and every tunnel's tasks.
pub(super) struct Registry<S> {
    tunnels: RwLock<HashMap<TunnelId, Tunnel<S>>>,
    events: broadcast::Sender<TunnelEvent>,
}

impl<S> Registry<S>
where
    S: ForwardSession,
{
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tunnels: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.events.subscribe()
    }

    pub async fn insert(&self, tunnel: Tunnel<S>) {
        let id = tunnel.info.id;
        self.tunnels.write().await.insert(id, tunnel);
        self.notify(TunnelEvent::Opened(id));
    }

    pub async fn snapshot(&self) -> Vec<TunnelInfo> {
        self.tunnels.read().await.values().map(|tunnel| tunnel.info.clone()).collect()
    }

    pub async fn cancel_signal(&self, id: TunnelId) -> Option<ShutdownSignal> {
        self.tunnels.read().await.get(&id).map(|tunnel| tunnel.cancel.clone())
    }

    pub async fn cancel_signals(&self) -> Vec<(TunnelId, ShutdownSignal)> {
        self.tunnels
            .read()
            .await
            .iter()
            .map(|(id, tunnel)| (*id, tunnel.cancel.clone()))
            .collect()
    }

    /// Tear a tunnel down. Safe to call more than once; only the first call
    /// for an id finds the entry and does any work.
    pub async fn cleanup(&self, id: TunnelId) {
        let Some(tunnel) = self.tunnels.write().await.remove(&id) else {
            debug!(tunnel = %id, "cleanup skipped; tunnel already removed");
            return;
        };
        // Lets the unblocker and health monitor finish even on a faulted exit.
        tunnel.cancel.fire();
        tunnel.listener_closed.fire();

        let session = tunnel.session;
        match tokio::spawn(async move { session.close().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(?err, tunnel = %id, "failed to close tunnel session"),
            Err(err) => warn!(?err, tunnel = %id, "tunnel session close panicked"),
        }
        info!(
            tunnel = %id,
            alias = %tunnel.info.alias,
            bind = %tunnel.info.local_addr,
            "tunnel closed"
        );
        self.notify(TunnelEvent::Closed(id));
    }

    fn notify(&self, event: TunnelEvent) {
        // No subscribers is fine; delivery is best-effort.
        let _ = self.events.send(event);
    }
}

/// Fire `cancel` once the session ends, for whatever reason.
pub(super) async fn run_health_monitor<S>(id: TunnelId, session: S, cancel: ShutdownSignal)
where
    S: ForwardSession,
{
    tokio::select! {
        _ = session.closed() => {
            if cancel.fire() {
                warn!(tunnel = %id, "ssh session ended; stopping tunnel");
            }
        }
        _ = cancel.fired() => {}
    }
}
