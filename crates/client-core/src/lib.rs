//! SSH client glue for the tunnel engine.
//!
//! [`SshConnector`] turns a host alias into an authenticated russh session:
//! profiles come from an OpenSSH-style config file, host keys from a JSON
//! known-hosts store, and credentials from identity files or a password.

pub mod auth;
pub mod error;
pub mod hostkeys;
pub mod profiles;

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use auth::{AuthMethod, authenticate, default_identity_files, resolve_methods};
pub use error::{ClientError, ClientResult};
pub use hostkeys::{HostKeyPolicy, KnownHosts, default_known_hosts_path};
use hostkeys::{ClientHandler, HostKeyVerifier};
pub use profiles::{HostProfile, SshConfig, default_config_path};
use russh::client;
use secrecy::SecretString;
use ssh_core::{ShutdownSignal, SshCoreError, SshResult, forwarding::SessionConnector, session::SshSession};
use tracing::{debug, info};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_MAX: usize = 3;

/// Where the connector reads its configuration from.
#[derive(Clone, Debug)]
pub struct ConnectorOptions {
    pub ssh_config: PathBuf,
    pub known_hosts: PathBuf,
    pub hostkey_policy: HostKeyPolicy,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            ssh_config: default_config_path(),
            known_hosts: default_known_hosts_path(),
            hostkey_policy: HostKeyPolicy::Strict,
        }
    }
}

/// Everything needed to open one session, produced by `resolve`.
#[derive(Debug)]
pub struct DialConfig {
    pub profile: HostProfile,
    pub methods: Vec<AuthMethod>,
}

impl DialConfig {
    fn authority(&self) -> String {
        format!("{}:{}", self.profile.host_name, self.profile.port)
    }
}

pub struct SshConnector {
    profiles: SshConfig,
    known_hosts: Arc<KnownHosts>,
    policy: HostKeyPolicy,
    config: Arc<client::Config>,
}

impl SshConnector {
    pub async fn new(options: ConnectorOptions) -> ClientResult<Self> {
        let profiles = SshConfig::load(&options.ssh_config).await?;
        let known_hosts = Arc::new(KnownHosts::load(options.known_hosts).await?);
        let config = client::Config {
            nodelay: true,
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        };
        Ok(Self {
            profiles,
            known_hosts,
            policy: options.hostkey_policy,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    type Target = DialConfig;
    type Session = SshSession<ClientHandler>;

    async fn resolve(&self, alias: &str, credential: Option<&SecretString>) -> SshResult<DialConfig> {
        let profile = self.profiles.resolve(alias)?;
        let identities = if profile.identity_files.is_empty() {
            default_identity_files()
        } else {
            profile.identity_files.clone()
        };
        let methods = resolve_methods(alias, &identities, credential).await?;
        debug!(alias, host = %profile.host_name, port = profile.port, user = %profile.user, ?methods, "resolved host profile");
        Ok(DialConfig { profile, methods })
    }

    async fn dial(&self, target: DialConfig) -> SshResult<Self::Session> {
        let authority = target.authority();
        let closed = ShutdownSignal::new();
        let verifier = HostKeyVerifier::new(Arc::clone(&self.known_hosts), authority.clone(), self.policy);
        let handler = ClientHandler::new(verifier, closed.clone());

        info!("connecting to {authority}");
        let profile = &target.profile;
        let mut handle = client::connect(Arc::clone(&self.config), (profile.host_name.as_str(), profile.port), handler)
            .await
            .map_err(|err| dial_error(&authority, err))?;
        if let Err(err) = authenticate(&mut handle, &profile.user, &target.methods).await {
            let session = SshSession::new(handle, closed);
            let _ = session.disconnect().await;
            return Err(dial_error(&authority, err));
        }
        Ok(SshSession::new(handle, closed))
    }
}

/// Keep typed setup failures, report the rest as a failed dial.
fn dial_error(authority: &str, err: ClientError) -> SshCoreError {
    match err {
        err @ (ClientError::HostKeyFailed(_) | ClientError::AuthFailed(_)) => err.into(),
        other => SshCoreError::dial(authority, other),
    }
}
