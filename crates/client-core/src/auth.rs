use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

// Internal Result type alias
type Result<T> = crate::ClientResult<T>;
use russh::{
    client::{self, AuthResult},
    keys::{self, HashAlg, PrivateKeyWithHashAlg},
};
use secrecy::{ExposeSecret, SecretString};
use ssh_core::session::SessionHandle;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{ClientError, profiles::fallback_home};

const DEFAULT_IDENTITIES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// One way of proving the user's identity, tried in order.
#[derive(Clone)]
pub enum AuthMethod {
    PublicKey { path: PathBuf, key: Arc<keys::PrivateKey> },
    Password(SecretString),
}

impl AuthMethod {
    fn label(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey { .. } => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::PublicKey { path, .. } => f.debug_struct("PublicKey").field("path", path).finish(),
            AuthMethod::Password(_) => f.write_str("Password(..)"),
        }
    }
}

/// Identity files OpenSSH tries when a profile names none.
pub fn default_identity_files() -> Vec<PathBuf> {
    let ssh_dir = fallback_home().join(".ssh");
    DEFAULT_IDENTITIES.iter().map(|name| ssh_dir.join(name)).collect()
}

/// Work out which methods to offer for `alias`.
///
/// The credential doubles as key passphrase and login password. Missing key
/// files are skipped. Fails with `PasswordRequired` when nothing usable is
/// left without a credential, and with `AuthFailed` when a key cannot be read
/// or decrypted.
pub async fn resolve_methods(alias: &str, identity_files: &[PathBuf], credential: Option<&SecretString>) -> Result<Vec<AuthMethod>> {
    let mut methods = Vec::new();
    for path in identity_files {
        let data = match fs::read_to_string(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "identity file not found; skipping");
                continue;
            }
            Err(err) => return Err(ClientError::AuthFailed(format!("failed to read {}: {err}", path.display()))),
        };
        match load_private_key(&data, path, credential) {
            Ok(Some(key)) => methods.push(AuthMethod::PublicKey {
                path: path.clone(),
                key: Arc::new(key),
            }),
            Ok(None) => debug!(path = %path.display(), "identity is encrypted and no passphrase was given"),
            Err(err) => return Err(ClientError::AuthFailed(err.to_string())),
        }
    }
    if let Some(password) = credential {
        methods.push(AuthMethod::Password(password.clone()));
    }
    if methods.is_empty() {
        return Err(ClientError::PasswordRequired(alias.to_string()));
    }
    Ok(methods)
}

/// Parse a private key; `Ok(None)` means it is encrypted and no passphrase was given.
fn load_private_key(data: &str, path: &Path, passphrase: Option<&SecretString>) -> Result<Option<keys::PrivateKey>> {
    let passphrase = passphrase.map(|secret| secret.expose_secret());
    if let Ok(key) = keys::PrivateKey::from_openssh(data) {
        if !key.is_encrypted() {
            return Ok(Some(key));
        }
        let Some(passphrase) = passphrase else {
            return Ok(None);
        };
        return key
            .decrypt(passphrase)
            .map(Some)
            .map_err(|err| ClientError::Crypto(format!("failed to decrypt {}: {err}", path.display())));
    }
    // PEM and other legacy encodings.
    match keys::decode_secret_key(data, passphrase) {
        Ok(key) => Ok(Some(key)),
        Err(keys::Error::KeyIsEncrypted) if passphrase.is_none() => Ok(None),
        Err(err) => Err(ClientError::Crypto(format!("failed to load {}: {err}", path.display()))),
    }
}

/// Try each method until the server accepts one.
pub async fn authenticate<H>(session: &mut SessionHandle<H>, username: &str, methods: &[AuthMethod]) -> Result<()>
where
    H: client::Handler + Send,
{
    let rsa_hash_hint = session.best_supported_rsa_hash().await.unwrap_or(None).flatten();

    for method in methods {
        let label = method.label();
        match try_method(session, username, method, rsa_hash_hint).await {
            Ok(AuthResult::Success) => {
                info!(method = label, user = username, "authentication succeeded");
                return Ok(());
            }
            Ok(AuthResult::Failure { .. }) => {
                warn!(method = label, "authentication rejected by server");
            }
            Err(err) => {
                warn!(method = label, error = ?err, "authentication attempt failed");
            }
        }
    }

    Err(ClientError::AuthFailed(format!(
        "all authentication methods were rejected by the server for {username}"
    )))
}

async fn try_method<H>(session: &mut SessionHandle<H>, username: &str, method: &AuthMethod, rsa_hint: Option<HashAlg>) -> Result<AuthResult>
where
    H: client::Handler + Send,
{
    match method {
        AuthMethod::Password(password) => session
            .authenticate_password(username.to_string(), password.expose_secret().to_string())
            .await
            .map_err(Into::into),
        AuthMethod::PublicKey { path, key } => {
            debug!(key = %path.display(), algorithm = ?key.algorithm(), "attempting public-key auth");
            let hash_alg = if key.algorithm().is_rsa() { rsa_hint } else { None };
            let key = PrivateKeyWithHashAlg::new(key.clone(), hash_alg);
            session.authenticate_publickey(username.to_string(), key).await.map_err(Into::into)
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
