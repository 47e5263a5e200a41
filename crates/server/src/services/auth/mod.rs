//! Authentication service.
//!
//! Turns a platform-signed init-data payload into a session credential.

mod error;

pub use error::AuthError;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use miniapp_core::{
    IdentityStore, IssuedCredential, RawFields, Rejection, ResolvedPrincipal, RevocationStamp,
    SessionCodec, SessionSubject, SignatureVerifier, TenantId,
};

use crate::services::identity::{IdentityResolver, Resolution};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub credential: IssuedCredential,
    pub principal: ResolvedPrincipal,
    /// `true` when this login created the account.
    pub created: bool,
}

/// Login service.
///
/// Verifies the payload, finds or creates the account, resolves its tenant
/// and issues a credential carrying the account's current stamp.
pub struct LoginService<'a> {
    store: &'a dyn IdentityStore,
    verifier: &'a SignatureVerifier,
    codec: &'a SessionCodec,
}

impl<'a> LoginService<'a> {
    /// Create a new login service.
    #[must_use]
    pub const fn new(
        store: &'a dyn IdentityStore,
        verifier: &'a SignatureVerifier,
        codec: &'a SessionCodec,
    ) -> Self {
        Self {
            store,
            verifier,
            codec,
        }
    }

    /// Log in with init-data fields.
    ///
    /// # Errors
    ///
    /// - `AuthError::Rejected` with the verifier's rejection if the payload
    ///   fails verification
    /// - `AuthError::Rejected(RoleInsufficient)` if the account is deleted or
    ///   the requested tenant is outside its clearance
    /// - `AuthError::Store` / `AuthError::Codec` on infrastructure failure
    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    pub async fn login(
        &self,
        fields: &RawFields,
        requested: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, AuthError> {
        let payload = self.verifier.verify(fields, now).inspect_err(|rejection| {
            warn!(code = rejection.code(), "init data rejected");
        })?;

        let upserted = self
            .store
            .upsert_platform_account(&payload.user, RevocationStamp::generate(), now)
            .await?;
        let account = upserted.account;

        if account.is_deleted() {
            warn!(account_id = %account.id, "login attempt on deleted account");
            return Err(Rejection::RoleInsufficient.into());
        }

        let principal = match IdentityResolver::new(self.store)
            .resolve_for(&account, requested)
            .await?
        {
            Resolution::Resolved { principal, .. } => principal,
            Resolution::NotFound | Resolution::TenantForbidden => {
                return Err(Rejection::RoleInsufficient.into());
            }
        };

        let credential = self.codec.issue(
            &SessionSubject {
                account_id: account.id,
                tenant_id: principal.tenant_id,
                role: account.role,
                stamp: account.revocation_stamp.clone(),
            },
            now,
        )?;

        info!(
            account_id = %account.id,
            role = account.role.as_str(),
            tenant_id = ?principal.tenant_id,
            created = upserted.created,
            "login succeeded"
        );

        Ok(LoginOutcome {
            credential,
            principal,
            created: upserted.created,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use miniapp_core::{ExternalId, Role, SessionTtl};
    use secrecy::SecretString;

    use super::*;
    use crate::db::MemoryIdentityStore;

    const BOT_TOKEN: &str = "7342037359:AAHb0t-t0ken-f0r-Test1ng";
    const SESSION_SECRET: &str = "k7Qm2vX9pL4sR8tW1yZ6bN3cF5hJ0dGa";

    struct Harness {
        store: MemoryIdentityStore,
        verifier: SignatureVerifier,
        codec: SessionCodec,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryIdentityStore::new(),
                verifier: SignatureVerifier::new(&SecretString::from(BOT_TOKEN)).unwrap(),
                codec: SessionCodec::new(
                    &SecretString::from(SESSION_SECRET),
                    SessionTtl::default(),
                ),
            }
        }

        fn service(&self) -> LoginService<'_> {
            LoginService::new(&self.store, &self.verifier, &self.codec)
        }

        fn signed_fields(&self, external_id: i64, now: DateTime<Utc>) -> RawFields {
            let mut fields = RawFields::new();
            fields.insert("auth_date", now.timestamp().to_string());
            fields.insert("query_id", "AAHdF6IQAAAAAN0XohDhrOrc");
            fields.insert(
                "user",
                format!(r#"{{"id":{external_id},"first_name":"Ada","username":"ada"}}"#),
            );
            let hash = self.verifier.sign(&fields);
            fields.insert("hash", hash);
            fields
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cold_signup_creates_end_user() {
        let h = Harness::new();
        let outcome = h
            .service()
            .login(&h.signed_fields(4242, now()), None, now())
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.principal.role, Role::EndUser);
        assert!(!outcome.principal.is_staff);
        assert_eq!(outcome.principal.tenant_id, None);

        let stored = h
            .store
            .account_by_external_id(ExternalId::new(4242))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.credential.claims.sub, stored.id);
        assert_eq!(outcome.credential.claims.stamp, stored.revocation_stamp);
        assert_eq!(
            outcome.credential.claims.exp - outcome.credential.claims.iat,
            SessionTtl::default().member.num_seconds()
        );
    }

    #[tokio::test]
    async fn test_second_login_reuses_account_and_stamp() {
        let h = Harness::new();
        let first = h
            .service()
            .login(&h.signed_fields(7, now()), None, now())
            .await
            .unwrap();
        let second = h
            .service()
            .login(&h.signed_fields(7, now()), None, now())
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(first.principal.account_id, second.principal.account_id);
        assert_eq!(first.credential.claims.stamp, second.credential.claims.stamp);
    }

    #[tokio::test]
    async fn test_staff_gets_short_credential() {
        let h = Harness::new();
        h.store
            .create_account(ExternalId::new(99), Role::PlatformSupport)
            .await
            .unwrap();
        let outcome = h
            .service()
            .login(&h.signed_fields(99, now()), None, now())
            .await
            .unwrap();
        assert!(outcome.credential.claims.staff);
        assert_eq!(
            outcome.credential.claims.exp - outcome.credential.claims.iat,
            SessionTtl::default().staff.num_seconds()
        );
    }

    #[tokio::test]
    async fn test_tampered_payload_is_rejected_without_account() {
        let h = Harness::new();
        let mut fields = h.signed_fields(5, now());
        fields.insert("user", r#"{"id":6,"first_name":"Mallory"}"#);

        let err = h.service().login(&fields, None, now()).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Rejected(Rejection::SignatureMismatch)
        ));
        assert!(h
            .store
            .account_by_external_id(ExternalId::new(6))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deleted_account_cannot_log_in() {
        let h = Harness::new();
        let account = h
            .store
            .create_account(ExternalId::new(8), Role::EndUser)
            .await
            .unwrap();
        h.store.soft_delete(account.id, now()).await.unwrap();

        let err = h
            .service()
            .login(&h.signed_fields(8, now()), None, now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Rejected(Rejection::RoleInsufficient)
        ));
    }

    #[tokio::test]
    async fn test_foreign_tenant_request_is_refused() {
        let h = Harness::new();
        let other = h
            .store
            .create_account(ExternalId::new(20), Role::MerchantOwner)
            .await
            .unwrap();
        let foreign = h.store.create_tenant(other.id, "Elsewhere").await.unwrap();

        let err = h
            .service()
            .login(&h.signed_fields(21, now()), Some(foreign.id), now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Rejected(Rejection::RoleInsufficient)
        ));
    }
}
