use ssh_core::SshCoreError;
use thiserror::Error;

/// Errors that can occur in client-core operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// SSH error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Known hosts file could not be read or written
    #[error("known hosts store error: {0}")]
    Store(#[from] serde_json::Error),

    /// Malformed ssh_config input
    #[error("{path}:{line}: {message}")]
    Config { path: String, line: usize, message: String },

    /// No profile matches the alias
    #[error("no host profile found for {0}")]
    HostNotFound(String),

    /// A password or key passphrase is needed and none was supplied
    #[error("password required for {0}")]
    PasswordRequired(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Host key verification failed
    #[error("host key verification failed: {0}")]
    HostKeyFailed(String),

    /// Cryptographic error
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

impl From<russh::keys::Error> for ClientError {
    fn from(err: russh::keys::Error) -> Self {
        ClientError::Crypto(err.to_string())
    }
}

// Setup failures keep their meaning when they cross into the tunnel engine.
impl From<ClientError> for SshCoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::HostNotFound(alias) => SshCoreError::HostNotFound(alias),
            ClientError::PasswordRequired(alias) => SshCoreError::PasswordRequired(alias),
            ClientError::AuthFailed(message) => SshCoreError::AuthFailed(message),
            ClientError::HostKeyFailed(message) => SshCoreError::HostKeyUnverified(message),
            ClientError::Io(err) => SshCoreError::Io(err),
            ClientError::Ssh(err) => SshCoreError::Ssh(err),
            other => SshCoreError::Other(other.to_string()),
        }
    }
}
