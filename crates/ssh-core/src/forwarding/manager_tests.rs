//! Unit tests for the tunnel registry and lifecycle tasks.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::time::{Duration, timeout};

use super::*;
use crate::forwarding::traits::ForwardStream;

#[derive(Clone, Default)]
struct StubSession {
    close_calls: Arc<AtomicUsize>,
    closed: ShutdownSignal,
}

#[async_trait]
impl ForwardSession for StubSession {
    async fn open_direct_tcpip(&self, host: String, port: u16, _: String, _: u16) -> Result<ForwardStream> {
        Err(SshCoreError::dial(format!("{host}:{port}"), "stub session"))
    }

    async fn closed(&self) {
        self.closed.fired().await
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.fire();
        Ok(())
    }
}

struct StubConnector;

#[async_trait]
impl SessionConnector for StubConnector {
    type Target = ();
    type Session = StubSession;

    async fn resolve(&self, alias: &str, _: Option<&SecretString>) -> Result<()> {
        match alias {
            "missing" => Err(SshCoreError::HostNotFound(alias.into())),
            _ => Ok(()),
        }
    }

    async fn dial(&self, _: ()) -> Result<StubSession> {
        Ok(StubSession::default())
    }
}

fn stub_tunnel(session: StubSession) -> Tunnel<StubSession> {
    Tunnel {
        info: TunnelInfo {
            id: TunnelId::new(),
            alias: "bastion".into(),
            kind: TunnelKind::DynamicForward,
            local_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 1080)),
            remote_addr: SOCKS_PROXY_LABEL.into(),
        },
        session,
        cancel: ShutdownSignal::new(),
        listener_closed: ShutdownSignal::new(),
    }
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let registry = Registry::new();
    let mut events = registry.subscribe();
    let session = StubSession::default();
    let tunnel = stub_tunnel(session.clone());
    let (id, cancel, listener_closed) = (tunnel.info.id, tunnel.cancel.clone(), tunnel.listener_closed.clone());
    registry.insert(tunnel).await;

    registry.cleanup(id).await;
    registry.cleanup(id).await;

    assert!(registry.snapshot().await.is_empty());
    assert_eq!(session.close_calls.load(Ordering::SeqCst), 1);
    assert!(cancel.is_fired());
    assert!(listener_closed.is_fired());
    assert_eq!(events.recv().await.unwrap(), TunnelEvent::Opened(id));
    assert_eq!(events.recv().await.unwrap(), TunnelEvent::Closed(id));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn health_monitor_fires_cancel_when_session_ends() {
    let session = StubSession::default();
    let cancel = ShutdownSignal::new();
    let monitor = tokio::spawn(run_health_monitor(TunnelId::new(), session.clone(), cancel.clone()));

    session.closed.fire();
    timeout(Duration::from_secs(1), monitor).await.unwrap().unwrap();
    assert!(cancel.is_fired());
}

#[tokio::test]
async fn health_monitor_exits_on_cancel() {
    let session = StubSession::default();
    let cancel = ShutdownSignal::new();
    let monitor = tokio::spawn(run_health_monitor(TunnelId::new(), session.clone(), cancel.clone()));

    cancel.fire();
    timeout(Duration::from_secs(1), monitor).await.unwrap().unwrap();
    assert!(!session.closed.is_fired());
}

#[tokio::test]
async fn stop_all_drains_the_registry() {
    let manager = TunnelManager::new(StubConnector);
    manager.start_dynamic_forward("bastion", 0, None, false).await.unwrap();
    manager.start_local_forward("bastion", 0, "db", 5432, None, false).await.unwrap();
    assert_eq!(manager.active_tunnels().await.len(), 2);

    manager.stop_all().await;
    timeout(Duration::from_secs(2), async {
        while !manager.active_tunnels().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn resolve_failure_registers_nothing() {
    let manager = TunnelManager::new(StubConnector);
    let err = manager.start_dynamic_forward("missing", 0, None, false).await.unwrap_err();
    assert!(matches!(err, SshCoreError::HostNotFound(_)));
    assert!(manager.active_tunnels().await.is_empty());
}

#[tokio::test]
async fn listener_fault_without_stop_cleans_the_tunnel_up() {
    let registry = Arc::new(Registry::new());
    let mut events = registry.subscribe();
    let session = StubSession::default();
    let tunnel = stub_tunnel(session.clone());
    let (id, cancel, listener_closed) = (tunnel.info.id, tunnel.cancel.clone(), tunnel.listener_closed.clone());
    registry.insert(tunnel).await;

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let acceptor = tokio::spawn(run_acceptor(Acceptor {
        id,
        listener: TunnelListener::new(listener, listener_closed.clone()),
        target: TunnelTarget::Socks,
        session: session.clone(),
        cancel: cancel.clone(),
        registry: Arc::clone(&registry),
    }));

    // Close the listener while nobody has asked the tunnel to stop.
    assert!(!cancel.is_fired());
    listener_closed.fire();
    timeout(Duration::from_secs(1), acceptor).await.unwrap().unwrap();

    assert!(registry.snapshot().await.is_empty());
    assert_eq!(session.close_calls.load(Ordering::SeqCst), 1);
    assert!(cancel.is_fired());
    assert_eq!(events.recv().await.unwrap(), TunnelEvent::Opened(id));
    assert_eq!(events.recv().await.unwrap(), TunnelEvent::Closed(id));
}

#[tokio::test]
async fn failed_setup_step_closes_the_session() {
    let session = StubSession::default();
    let step: Result<SocketAddr> = Err(std::io::Error::other("socket gone").into());
    let err = close_on_error(&session, "bastion", step).await.unwrap_err();
    assert!(matches!(err, SshCoreError::Io(_)));
    assert_eq!(session.close_calls.load(Ordering::SeqCst), 1);

    let ok = close_on_error(&session, "bastion", Ok(7u16)).await.unwrap();
    assert_eq!(ok, 7);
    assert_eq!(session.close_calls.load(Ordering::SeqCst), 1);
}
