//! Machine-readable rejection codes.
//!
//! Every expected authentication or authorization failure is one of these
//! values. They are returned as ordinary results (never raised as errors) so
//! the perimeter can pick an HTTP status per reason, and they are safe to
//! expose to clients verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request or login payload was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    /// A required payload field is missing or undecodable.
    #[error("PAYLOAD_MALFORMED")]
    PayloadMalformed,
    /// The payload HMAC does not match.
    #[error("SIGNATURE_MISMATCH")]
    SignatureMismatch,
    /// `auth_date` lies outside the accepted window.
    #[error("TEMPORAL_WINDOW_EXCEEDED")]
    TemporalWindowExceeded,
    /// Neither a session cookie nor a bearer header was presented.
    #[error("CREDENTIAL_MISSING")]
    CredentialMissing,
    /// The session credential failed signature or expiry checks.
    #[error("CREDENTIAL_MALFORMED_OR_EXPIRED")]
    CredentialMalformedOrExpired,
    /// The credential's revocation stamp no longer matches the account.
    #[error("CREDENTIAL_REVOKED")]
    CredentialRevoked,
    /// A supplied tenant identifier is not well-formed.
    #[error("TENANT_ID_MALFORMED")]
    TenantIdMalformed,
    /// The principal lacks the role or tenant clearance required.
    #[error("ROLE_INSUFFICIENT")]
    RoleInsufficient,
}

/// Coarse grouping used to choose a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionClass {
    /// Caller is not (or no longer) authenticated.
    Unauthenticated,
    /// Caller is authenticated but not cleared for the resource.
    Forbidden,
    /// Caller sent input that cannot be interpreted.
    BadRequest,
}

impl Rejection {
    /// The wire code, identical to the `Display` output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PayloadMalformed => "PAYLOAD_MALFORMED",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::TemporalWindowExceeded => "TEMPORAL_WINDOW_EXCEEDED",
            Self::CredentialMissing => "CREDENTIAL_MISSING",
            Self::CredentialMalformedOrExpired => "CREDENTIAL_MALFORMED_OR_EXPIRED",
            Self::CredentialRevoked => "CREDENTIAL_REVOKED",
            Self::TenantIdMalformed => "TENANT_ID_MALFORMED",
            Self::RoleInsufficient => "ROLE_INSUFFICIENT",
        }
    }

    /// Response class for this rejection.
    #[must_use]
    pub const fn class(&self) -> RejectionClass {
        match self {
            Self::PayloadMalformed
            | Self::SignatureMismatch
            | Self::TemporalWindowExceeded
            | Self::CredentialMissing
            | Self::CredentialMalformedOrExpired
            | Self::CredentialRevoked => RejectionClass::Unauthenticated,
            Self::RoleInsufficient => RejectionClass::Forbidden,
            Self::TenantIdMalformed => RejectionClass::BadRequest,
        }
    }
}
