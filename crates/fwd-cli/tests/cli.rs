use std::{env, net::SocketAddr, path::PathBuf, sync::Mutex};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use client_core::HostKeyPolicy;
use fwd_cli::{
    cli::{FwdArgs, ForwardRequest, PASSWORD_ENV, PasswordSource, RunConfig},
    run::{render_table, start_forwards},
};
use fwd_types::{DynamicSocksForward, LocalTcpForward, TunnelId, TunnelInfo, TunnelKind};
use secrecy::{ExposeSecret, SecretString};
use serial_test::serial;
use ssh_core::{
    ShutdownSignal, SshCoreError, SshResult,
    forwarding::{ForwardSession, ForwardStream, SessionConnector, TunnelManager},
};

static ENV_GUARD: Mutex<()> = Mutex::new(());

fn parse_config(argv: &[&str]) -> Result<RunConfig> {
    let args = FwdArgs::try_parse_from(std::iter::once("fwd").chain(argv.iter().copied()))?;
    RunConfig::try_from(args)
}

fn with_password_env<T>(value: Option<&str>, f: impl FnOnce() -> T) -> T {
    let _guard = ENV_GUARD.lock().expect("env guard poisoned");
    let previous = env::var(PASSWORD_ENV).ok();
    match value {
        Some(v) => unsafe { env::set_var(PASSWORD_ENV, v) },
        None => unsafe { env::remove_var(PASSWORD_ENV) },
    }
    let result = f();
    match previous {
        Some(v) => unsafe { env::set_var(PASSWORD_ENV, v) },
        None => unsafe { env::remove_var(PASSWORD_ENV) },
    }
    result
}

#[test]
#[serial]
fn forwards_keep_command_line_order_by_kind() {
    let cfg = with_password_env(None, || parse_config(&["-L", "8080:internal.service:80", "-D", "1080", "-L", "*:5432:db:5432", "bastion"]))
        .expect("valid forwards");
    assert_eq!(cfg.alias, "bastion");
    assert_eq!(
        cfg.forwards,
        vec![
            ForwardRequest::Local(LocalTcpForward {
                gateway: false,
                bind_port: 8080,
                target_host: "internal.service".into(),
                target_port: 80,
            }),
            ForwardRequest::Local(LocalTcpForward {
                gateway: true,
                bind_port: 5432,
                target_host: "db".into(),
                target_port: 5432,
            }),
            ForwardRequest::Dynamic(DynamicSocksForward {
                gateway: false,
                bind_port: 1080,
            }),
        ]
    );
    assert!(matches!(cfg.password, PasswordSource::OnDemand));
    assert_eq!(cfg.connector.hostkey_policy, HostKeyPolicy::Strict);
}

#[test]
#[serial]
fn gateway_flag_applies_to_every_forward() {
    let cfg = with_password_env(None, || parse_config(&["-g", "-L", "8080:web:80", "-D", "1080", "bastion"])).unwrap();
    assert!(cfg.forwards.iter().all(|forward| match forward {
        ForwardRequest::Local(f) => f.gateway,
        ForwardRequest::Dynamic(f) => f.gateway,
    }));
}

#[test]
#[serial]
fn requires_at_least_one_forward() {
    let err = with_password_env(None, || parse_config(&["bastion"])).unwrap_err();
    assert!(err.to_string().contains("nothing to forward"), "unexpected error: {err}");
}

#[test]
#[serial]
fn invalid_forward_specs_error() {
    let err = parse_config(&["-L", "bad-spec", "bastion"]).unwrap_err();
    assert!(err.to_string().contains("invalid local TCP forward spec"), "unexpected error: {err}");
    let err = parse_config(&["-D", "addr:too:many", "bastion"]).unwrap_err();
    assert!(err.to_string().contains("invalid dynamic SOCKS forward spec"), "unexpected error: {err}");
}

#[test]
#[serial]
fn config_paths_and_hostkey_policy() {
    let cfg = with_password_env(None, || {
        parse_config(&[
            "--ssh-config",
            "/tmp/ssh_config",
            "--known-hosts",
            "/tmp/known.json",
            "--accept-new-hostkey",
            "-D",
            "1080",
            "bastion",
        ])
    })
    .unwrap();
    assert_eq!(cfg.connector.ssh_config, PathBuf::from("/tmp/ssh_config"));
    assert_eq!(cfg.connector.known_hosts, PathBuf::from("/tmp/known.json"));
    assert_eq!(cfg.connector.hostkey_policy, HostKeyPolicy::AcceptNew);
}

#[test]
#[serial]
fn password_sources() {
    let cfg = with_password_env(Some("s3cret"), || parse_config(&["-D", "1080", "bastion"])).unwrap();
    match cfg.password {
        PasswordSource::Provided(secret) => assert_eq!(secret.expose_secret(), "s3cret"),
        other => panic!("expected env password, got {other:?}"),
    }
    let cfg = with_password_env(Some("s3cret"), || parse_config(&["--password-stdin", "-D", "1080", "bastion"])).unwrap();
    assert!(matches!(cfg.password, PasswordSource::Stdin));
    let cfg = with_password_env(None, || parse_config(&["-p", "-D", "1080", "bastion"])).unwrap();
    assert!(matches!(cfg.password, PasswordSource::Prompt));
    assert!(parse_config(&["-p", "--password-stdin", "-D", "1080", "bastion"]).is_err());
}

#[test]
fn verbosity_counts_flags() {
    assert_eq!(FwdArgs::try_parse_from(["fwd", "-vv", "-D", "1", "a"]).unwrap().verbosity(), 2);
    assert_eq!(FwdArgs::try_parse_from(["fwd", "-q", "-D", "1", "a"]).unwrap().verbosity(), -1);
    assert!(FwdArgs::try_parse_from(["fwd", "-v", "-q", "-D", "1", "a"]).is_err());
}

#[test]
fn table_is_aligned_and_sorted_by_local_address() {
    let socks = TunnelInfo {
        id: TunnelId::new(),
        alias: "bastion".into(),
        kind: TunnelKind::DynamicForward,
        local_addr: "127.0.0.1:1080".parse::<SocketAddr>().unwrap(),
        remote_addr: fwd_types::SOCKS_PROXY_LABEL.into(),
    };
    let web = TunnelInfo {
        id: TunnelId::new(),
        alias: "bastion".into(),
        kind: TunnelKind::LocalForward,
        local_addr: "0.0.0.0:8080".parse::<SocketAddr>().unwrap(),
        remote_addr: "web:80".into(),
    };
    let table = render_table(&[socks.clone(), web.clone()]);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID"));
    assert!(lines[1].starts_with(&web.id.to_string()));
    assert!(lines[2].starts_with(&socks.id.to_string()));
    let column = lines[0].find("LOCAL").unwrap();
    assert_eq!(&lines[1][column..column + 12], "0.0.0.0:8080");
    assert_eq!(&lines[2][column..column + 14], "127.0.0.1:1080");
    assert!(lines[2].ends_with("SOCKS5 proxy"));
}

#[derive(Clone, Default)]
struct IdleSession {
    closed: ShutdownSignal,
}

#[async_trait]
impl ForwardSession for IdleSession {
    async fn open_direct_tcpip(&self, host: String, port: u16, _: String, _: u16) -> SshResult<ForwardStream> {
        Err(SshCoreError::dial(format!("{host}:{port}"), "idle session"))
    }

    async fn closed(&self) {
        self.closed.fired().await
    }

    async fn close(&self) -> SshResult<()> {
        self.closed.fire();
        Ok(())
    }
}

struct LockedConnector;

#[async_trait]
impl SessionConnector for LockedConnector {
    type Target = ();
    type Session = IdleSession;

    async fn resolve(&self, alias: &str, credential: Option<&SecretString>) -> SshResult<()> {
        match (alias, credential) {
            ("bastion", Some(secret)) if secret.expose_secret() == "pw" => Ok(()),
            ("bastion", Some(_)) => Err(SshCoreError::AuthFailed("bad password".into())),
            ("bastion", None) => Err(SshCoreError::PasswordRequired(alias.into())),
            _ => Err(SshCoreError::HostNotFound(alias.into())),
        }
    }

    async fn dial(&self, _: ()) -> SshResult<IdleSession> {
        Ok(IdleSession::default())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_forwards_uses_the_supplied_credential() -> Result<()> {
    let manager = TunnelManager::new(LockedConnector);
    let forwards = [
        ForwardRequest::Dynamic(DynamicSocksForward {
            gateway: false,
            bind_port: 0,
        }),
        ForwardRequest::Local(LocalTcpForward {
            gateway: false,
            bind_port: 0,
            target_host: "db".into(),
            target_port: 5432,
        }),
    ];
    let mut credential = Some(SecretString::from("pw"));
    let ids = start_forwards(&manager, "bastion", &forwards, &mut credential).await?;
    assert_eq!(ids.len(), 2);
    assert_eq!(manager.active_tunnels().await.len(), 2);
    manager.stop_all().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_forwards_reports_which_forward_failed() -> Result<()> {
    let manager = TunnelManager::new(LockedConnector);
    let forwards = [ForwardRequest::Dynamic(DynamicSocksForward {
        gateway: false,
        bind_port: 0,
    })];
    let mut credential = Some(SecretString::from("wrong"));
    let err = start_forwards(&manager, "bastion", &forwards, &mut credential).await.unwrap_err();
    assert!(err.to_string().contains("failed to start -D 0"), "unexpected error: {err}");
    assert!(matches!(err.downcast_ref::<SshCoreError>(), Some(SshCoreError::AuthFailed(_))));

    let err = start_forwards(&manager, "elsewhere", &forwards, &mut None).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<SshCoreError>(), Some(SshCoreError::HostNotFound(_))));
    assert!(manager.active_tunnels().await.is_empty());
    Ok(())
}
