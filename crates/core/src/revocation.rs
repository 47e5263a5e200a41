//! Force-logout detection.
//!
//! Each account carries a revocation stamp and every credential carries the
//! stamp that was current when it was issued. Rotating the account's stamp
//! therefore kills every outstanding credential at its next use.

use crate::session::SessionClaims;
use crate::types::Account;

/// Outcome of a revocation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    Valid,
    Revoked,
}

impl RevocationStatus {
    #[must_use]
    pub const fn is_revoked(self) -> bool {
        matches!(self, Self::Revoked)
    }
}

/// Compare a credential's stamp with the account's current one.
///
/// Accounts with no stamp recorded (rows created before stamps existed)
/// accept any credential; they cannot be force-logged-out until a stamp is
/// first rotated onto them.
#[must_use]
pub fn check(claims: &SessionClaims, account: &Account) -> RevocationStatus {
    match &account.revocation_stamp {
        None => RevocationStatus::Valid,
        Some(current) if claims.stamp.as_ref() == Some(current) => RevocationStatus::Valid,
        Some(_) => RevocationStatus::Revoked,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{
        AccountId, AccountProfile, ExternalId, RevocationStamp, Role,
    };

    fn account(stamp: Option<RevocationStamp>) -> Account {
        Account {
            id: AccountId::generate(),
            external_id: ExternalId::new(42),
            role: Role::EndUser,
            revocation_stamp: stamp,
            deleted_at: None,
            profile: AccountProfile::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn claims_for(account: &Account, stamp: Option<RevocationStamp>) -> SessionClaims {
        SessionClaims {
            sub: account.id,
            tid: None,
            role: account.role,
            staff: false,
            stamp,
            iat: 0,
            exp: 1,
        }
    }

    #[test]
    fn test_matching_stamp_is_valid() {
        let stamp = RevocationStamp::generate();
        let account = account(Some(stamp.clone()));
        let claims = claims_for(&account, Some(stamp));
        assert_eq!(check(&claims, &account), RevocationStatus::Valid);
    }

    #[test]
    fn test_rotated_stamp_revokes() {
        let old = RevocationStamp::generate();
        let mut account = account(Some(old.clone()));
        let claims = claims_for(&account, Some(old));

        account.revocation_stamp = Some(RevocationStamp::generate());
        assert!(check(&claims, &account).is_revoked());

        // A credential carrying the new stamp is accepted again
        let fresh = claims_for(&account, account.revocation_stamp.clone());
        assert_eq!(check(&fresh, &account), RevocationStatus::Valid);
    }

    #[test]
    fn test_stampless_account_accepts_any_credential() {
        let account = account(None);
        assert_eq!(
            check(&claims_for(&account, None), &account),
            RevocationStatus::Valid
        );
        assert_eq!(
            check(
                &claims_for(&account, Some(RevocationStamp::generate())),
                &account
            ),
            RevocationStatus::Valid
        );
    }

    #[test]
    fn test_stampless_credential_against_stamped_account_is_revoked() {
        let account = account(Some(RevocationStamp::generate()));
        assert!(check(&claims_for(&account, None), &account).is_revoked());
    }
}
