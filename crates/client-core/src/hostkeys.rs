use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use russh::keys::{self, HashAlg, PublicKey};
use serde::{Deserialize, Serialize};
use ssh_core::ShutdownSignal;
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::profiles::fallback_home;

// Internal Result type alias
type Result<T> = crate::ClientResult<T>;

/// What to do with a host key that is not in the store yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Reject unknown keys.
    #[default]
    Strict,
    /// Trust and record unknown keys on first use.
    AcceptNew,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnownHostsFile {
    #[serde(default)]
    hosts: BTreeMap<String, String>,
}

/// Host keys keyed by `host:port`, persisted as JSON.
#[derive(Debug)]
pub struct KnownHosts {
    path: PathBuf,
    entries: Mutex<KnownHostsFile>,
}

impl KnownHosts {
    /// Load the store. A missing file starts empty and is created on first write.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => KnownHostsFile::default(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => KnownHostsFile::default(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), hosts = entries.hosts.len(), "loaded known hosts");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, authority: &str) -> Option<String> {
        self.entries.lock().await.hosts.get(authority).cloned()
    }

    /// Record a key and write the whole store back to disk.
    pub async fn insert(&self, authority: &str, key: String) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.hosts.insert(authority.to_string(), key);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(&*entries)?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }
}

/// Default store location under the user config directory.
pub fn default_known_hosts_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| fallback_home().join(".config"))
        .join("sshfwd")
        .join("known_hosts.json")
}

pub struct HostKeyVerifier {
    store: Arc<KnownHosts>,
    authority: String,
    policy: HostKeyPolicy,
}

impl HostKeyVerifier {
    pub fn new(store: Arc<KnownHosts>, authority: String, policy: HostKeyPolicy) -> Self {
        Self {
            store,
            authority,
            policy,
        }
    }

    pub async fn check(&self, server_key: &PublicKey) -> Result<bool> {
        let presented = server_key
            .to_openssh()
            .map_err(|e| crate::ClientError::Crypto(e.to_string()))?;
        let presented_fp = server_key.fingerprint(HashAlg::Sha256).to_string();
        if let Some(stored) = self.store.get(&self.authority).await {
            if stored == presented {
                info!(authority = %self.authority, "host key verified against known hosts");
                return Ok(true);
            }
            let cached_fp = fingerprint_for_string(&stored).unwrap_or_else(|| "<invalid entry>".into());
            return Err(crate::ClientError::HostKeyFailed(format!(
                "host key mismatch for {} (known SHA256 {} vs received {})",
                self.authority, cached_fp, presented_fp
            )));
        }

        match self.policy {
            HostKeyPolicy::Strict => Err(crate::ClientError::HostKeyFailed(format!(
                "unknown host key for {} ({} {}); rerun with --accept-new-hostkey to trust it",
                self.authority,
                server_key.algorithm(),
                presented_fp
            ))),
            HostKeyPolicy::AcceptNew => {
                self.store.insert(&self.authority, presented).await?;
                warn!(authority = %self.authority, fingerprint = %presented_fp, "stored new host key");
                Ok(true)
            }
        }
    }
}

/// russh client handler for forwarding sessions.
///
/// Fires `closed` when dropped; russh drops the handler once the connection
/// task ends, which is how the session's liveness signal learns of teardown.
pub struct ClientHandler {
    verifier: Arc<HostKeyVerifier>,
    closed: ShutdownSignal,
}

impl ClientHandler {
    pub fn new(verifier: HostKeyVerifier, closed: ShutdownSignal) -> Self {
        Self {
            verifier: Arc::new(verifier),
            closed,
        }
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        if self.closed.fire() {
            debug!(authority = %self.verifier.authority, "ssh connection task ended");
        }
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = crate::ClientError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = std::result::Result<bool, Self::Error>> + Send {
        let verifier = Arc::clone(&self.verifier);
        let key = server_public_key.clone();
        async move { verifier.check(&key).await }
    }
}

fn fingerprint_for_string(blob: &str) -> Option<String> {
    let mut parts = blob.split_whitespace();
    let maybe_key = match (parts.next(), parts.next()) {
        (Some(_algo), Some(key)) => Some(key),
        (Some(key), None) => Some(key),
        _ => None,
    }?;
    let parsed = keys::parse_public_key_base64(maybe_key).ok()?;
    Some(parsed.fingerprint(HashAlg::Sha256).to_string())
}
