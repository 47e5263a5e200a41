//! Authentication error types.

use miniapp_core::{CodecError, Rejection, StoreError};
use thiserror::Error;

/// Errors that can occur during login.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The caller failed a protocol check.
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Storage backend error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The session credential could not be issued.
    #[error("credential issue failed: {0}")]
    Codec(#[from] CodecError),
}
