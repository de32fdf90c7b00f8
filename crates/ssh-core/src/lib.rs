pub mod error;
pub mod forwarding;
pub mod session;
pub mod signal;

pub use error::{SshCoreError, SshResult};
pub use signal::ShutdownSignal;
