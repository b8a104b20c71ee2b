//! Shared result and error types.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HearthError>;

/// Error type for runtime operations.
///
/// Transport and collaborator failures are retried or surfaced as status by
/// the components that produce them; protocol violations are dropped at the
/// edge and never propagate into the store mutation path.
#[derive(Debug, Error)]
pub enum HearthError {
    /// Channel or collaborator transport failure (retryable)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed inbound data (dropped, never propagated)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An external collaborator returned an unusable response
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The runtime was torn down while a call was in flight
    #[error("Runtime is shut down")]
    ShutDown,

    /// Internal invariant failure
    #[error("Internal error: {0}")]
    Internal(String),
}
