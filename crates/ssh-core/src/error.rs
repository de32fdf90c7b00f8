use fwd_types::TunnelId;
use thiserror::Error;

/// Errors that can occur in SSH core operations
#[derive(Error, Debug)]
pub enum SshCoreError {
    /// Invalid port number
    #[error("port must be a valid number between 0-65535: {0}")]
    InvalidPort(String),

    /// Invalid forwarding specification
    #[error("invalid {kind} forward spec: {message}")]
    InvalidForwardSpec { kind: String, message: String },

    /// No host profile matches the alias
    #[error("no host profile found for {0}")]
    HostNotFound(String),

    /// The host profile needs a password and none was supplied
    #[error("password required for {0}")]
    PasswordRequired(String),

    /// The server rejected every authentication attempt
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server's host key is unknown or does not match the stored key
    #[error("host key verification failed: {0}")]
    HostKeyUnverified(String),

    /// Opening the secure transport session failed
    #[error("failed to connect to {address}: {message}")]
    Dial { address: String, message: String },

    /// Network binding failed
    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// No tunnel registered under the id
    #[error("tunnel {0} not found")]
    NotFound(TunnelId),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH protocol error
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for SSH core operations
pub type SshResult<T> = Result<T, SshCoreError>;

impl SshCoreError {
    /// Create an invalid forward spec error
    pub fn invalid_forward(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidForwardSpec {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a dial error for the given address
    pub fn dial(address: impl Into<String>, message: impl ToString) -> Self {
        Self::Dial {
            address: address.into(),
            message: message.to_string(),
        }
    }
}
