use std::sync::Arc;

use fwd_types::{SOCKS_PROXY_LABEL, TunnelEvent, TunnelId, TunnelInfo, TunnelKind};
use secrecy::SecretString;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

use super::{
    acceptor::{Acceptor, TunnelListener, run_acceptor},
    traits::{ForwardSession, SessionConnector},
    tunnel::{Registry, Tunnel, TunnelTarget, run_health_monitor},
};
use crate::{SshCoreError, signal::ShutdownSignal};

type Result<T> = crate::SshResult<T>;

const LOOPBACK: &str = "127.0.0.1";
const ALL_INTERFACES: &str = "0.0.0.0";

struct ManagerState<C>
where
    C: SessionConnector,
{
    connector: C,
    registry: Arc<Registry<C::Session>>,
}

/// Starts, tracks, and stops local and dynamic forwarding tunnels.
///
/// Every tunnel owns its own SSH session and listening socket. Cloning the
/// manager shares the same registry.
pub struct TunnelManager<C>
where
    C: SessionConnector,
{
    state: Arc<ManagerState<C>>,
}

impl<C> Clone for TunnelManager<C>
where
    C: SessionConnector,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C> TunnelManager<C>
where
    C: SessionConnector,
{
    pub fn new(connector: C) -> Self {
        Self {
            state: Arc::new(ManagerState {
                connector,
                registry: Arc::new(Registry::new()),
            }),
        }
    }

    /// Forward `local_port` to `remote_host:remote_port` through a new session to `alias`.
    ///
    /// Returns once the listener is bound and the tunnel registered.
    pub async fn start_local_forward(
        &self,
        alias: &str,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
        credential: Option<&SecretString>,
        gateway: bool,
    ) -> Result<TunnelId> {
        let target = TunnelTarget::Fixed {
            host: remote_host.to_string(),
            port: remote_port,
        };
        self.start_tunnel(alias, local_port, target, credential, gateway).await
    }

    /// Run a SOCKS5 proxy on `local_port` through a new session to `alias`.
    pub async fn start_dynamic_forward(
        &self,
        alias: &str,
        local_port: u16,
        credential: Option<&SecretString>,
        gateway: bool,
    ) -> Result<TunnelId> {
        self.start_tunnel(alias, local_port, TunnelTarget::Socks, credential, gateway).await
    }

    /// Request a tunnel stop. Cleanup runs asynchronously.
    pub async fn stop_forward(&self, id: TunnelId) -> Result<()> {
        let cancel = self
            .state
            .registry
            .cancel_signal(id)
            .await
            .ok_or(SshCoreError::NotFound(id))?;
        if cancel.fire() {
            info!(tunnel = %id, "tunnel stop requested");
        }
        Ok(())
    }

    /// Request a stop of every registered tunnel.
    pub async fn stop_all(&self) {
        for (id, cancel) in self.state.registry.cancel_signals().await {
            if cancel.fire() {
                info!(tunnel = %id, "tunnel stop requested");
            }
        }
    }

    pub async fn active_tunnels(&self) -> Vec<TunnelInfo> {
        self.state.registry.snapshot().await
    }

    /// Subscribe to registry change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.state.registry.subscribe()
    }

    async fn start_tunnel(
        &self,
        alias: &str,
        local_port: u16,
        target: TunnelTarget,
        credential: Option<&SecretString>,
        gateway: bool,
    ) -> Result<TunnelId> {
        let dial_target = self.state.connector.resolve(alias, credential).await?;
        let session = self.state.connector.dial(dial_target).await?;

        let bind_host = if gateway { ALL_INTERFACES } else { LOOPBACK };
        let bound = TcpListener::bind((bind_host, local_port))
            .await
            .map_err(|source| SshCoreError::BindFailed {
                address: format!("{bind_host}:{local_port}"),
                source,
            });
        let listener = close_on_error(&session, alias, bound).await?;

        let listener_closed = ShutdownSignal::new();
        let listener = TunnelListener::new(listener, listener_closed.clone());
        let local_addr = close_on_error(&session, alias, listener.local_addr().map_err(Into::into)).await?;
        let (kind, remote_addr) = match &target {
            TunnelTarget::Fixed { host, port } => (TunnelKind::LocalForward, format!("{host}:{port}")),
            TunnelTarget::Socks => (TunnelKind::DynamicForward, SOCKS_PROXY_LABEL.to_string()),
        };
        let info = TunnelInfo {
            id: TunnelId::new(),
            alias: alias.to_string(),
            kind,
            local_addr,
            remote_addr,
        };
        let id = info.id;
        let cancel = ShutdownSignal::new();

        info!(
            tunnel = %id,
            alias,
            kind = %info.kind,
            bind = %info.local_addr,
            target = %info.remote_addr,
            "tunnel listening"
        );
        let registry = Arc::clone(&self.state.registry);
        registry
            .insert(Tunnel {
                info,
                session: session.clone(),
                cancel: cancel.clone(),
                listener_closed,
            })
            .await;

        tokio::spawn(run_acceptor(Acceptor {
            id,
            listener,
            target,
            session: session.clone(),
            cancel: cancel.clone(),
            registry,
        }));
        tokio::spawn(run_health_monitor(id, session, cancel));
        Ok(id)
    }
}

/// Close a freshly dialed session when a later setup step fails.
async fn close_on_error<S, T>(session: &S, alias: &str, step: Result<T>) -> Result<T>
where
    S: ForwardSession,
{
    if let Err(err) = &step {
        if let Err(close_err) = session.close().await {
            warn!(?close_err, alias, error = %err, "failed to close session after setup failure");
        }
    }
    step
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
