//! Session credential issuance and verification.
//!
//! Credentials are HS256 JWTs signed with the server's session secret. They
//! carry everything the gatekeeper needs to rebuild a principal without a
//! session store; the revocation stamp inside is compared against the
//! account separately (see [`crate::revocation`]).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rejection::Rejection;
use crate::types::{AccountId, RevocationStamp, Role, SessionTier, TenantId};

/// Default lifetime of a staff credential (8 hours).
pub const DEFAULT_STAFF_TTL_SECS: i64 = 8 * 60 * 60;
/// Default lifetime of a merchant or end-user credential (30 days).
pub const DEFAULT_MEMBER_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Claims embedded in every session credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the internal account ID.
    pub sub: AccountId,
    /// Tenant the session was resolved against at login.
    #[serde(default)]
    pub tid: Option<TenantId>,
    pub role: Role,
    pub staff: bool,
    /// Copy of the account's revocation stamp at issuance.
    #[serde(default)]
    pub stamp: Option<RevocationStamp>,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

impl SessionClaims {
    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// The subject these claims were issued for.
    #[must_use]
    pub fn subject(&self) -> SessionSubject {
        SessionSubject {
            account_id: self.sub,
            tenant_id: self.tid,
            role: self.role,
            stamp: self.stamp.clone(),
        }
    }
}

/// Input to [`SessionCodec::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubject {
    pub account_id: AccountId,
    pub tenant_id: Option<TenantId>,
    pub role: Role,
    pub stamp: Option<RevocationStamp>,
}

/// Credential lifetimes per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtl {
    pub staff: Duration,
    pub member: Duration,
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            staff: Duration::seconds(DEFAULT_STAFF_TTL_SECS),
            member: Duration::seconds(DEFAULT_MEMBER_TTL_SECS),
        }
    }
}

impl SessionTtl {
    /// Lifetime for credentials issued to `role`.
    #[must_use]
    pub const fn for_role(&self, role: Role) -> Duration {
        match role.tier() {
            SessionTier::Staff => self.staff,
            SessionTier::Member => self.member,
        }
    }
}

/// A freshly signed credential and the claims it carries.
#[derive(Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub claims: SessionClaims,
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Errors from issuing a credential.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Token encoding failed.
    #[error("session token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
    /// The configured lifetime pushes expiry out of range.
    #[error("session expiry out of range")]
    ExpiryOutOfRange,
}

/// Why a presented credential could not be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialFault {
    #[error("credential signature invalid")]
    BadSignature,
    #[error("credential expired")]
    Expired,
    #[error("credential malformed")]
    Malformed,
}

impl From<CredentialFault> for Rejection {
    fn from(_: CredentialFault) -> Self {
        Self::CredentialMalformedOrExpired
    }
}

/// Issues and verifies session credentials.
#[derive(Clone)]
pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: SessionTtl,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Build a codec keyed with the session secret.
    #[must_use]
    pub fn new(secret: &SecretString, ttl: SessionTtl) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);
        validation.leeway = 0;
        // Expiry is compared against the caller's clock in `verify`.
        validation.validate_exp = false;

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    /// Configured lifetimes.
    #[must_use]
    pub const fn ttl(&self) -> SessionTtl {
        self.ttl
    }

    /// Sign a credential for `subject`, expiring per its role tier.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the expiry overflows or encoding fails.
    pub fn issue(
        &self,
        subject: &SessionSubject,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, CodecError> {
        let expires_at = now
            .checked_add_signed(self.ttl.for_role(subject.role))
            .ok_or(CodecError::ExpiryOutOfRange)?;

        let claims = SessionClaims {
            sub: subject.account_id,
            tid: subject.tenant_id,
            role: subject.role,
            staff: subject.role.is_staff(),
            stamp: subject.stamp.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedCredential { token, claims })
    }

    /// Verify a credential's signature and expiry at `now`.
    ///
    /// A credential is expired once `now` reaches `exp`. Revocation is not
    /// checked here.
    ///
    /// # Errors
    ///
    /// Returns the `CredentialFault` describing why the token was refused.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, CredentialFault> {
        let claims = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    CredentialFault::BadSignature
                }
                ErrorKind::ExpiredSignature => CredentialFault::Expired,
                _ => CredentialFault::Malformed,
            })?;

        if now.timestamp() >= claims.exp {
            return Err(CredentialFault::Expired);
        }
        // The staff flag is derived, never trusted on its own.
        if claims.staff != claims.role.is_staff() {
            return Err(CredentialFault::Malformed);
        }
        Ok(claims)
    }
}
