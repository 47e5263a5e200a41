//! Platform init-data signature verification.
//!
//! The chat client hands the mini app a URL-encoded field set signed by the
//! platform with a key derived from the bot's shared secret:
//!
//! ```text
//! secret_key = HMAC_SHA256(key = "WebAppData", msg = shared_secret)
//! check      = sorted "key=value" lines (everything except `hash`), "\n"-joined
//! hash       = hex(HMAC_SHA256(key = secret_key, msg = check))
//! ```
//!
//! Verification is a pure function of the fields, the shared secret and the
//! supplied `now`; the only time dependence is the explicit replay window.

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::rejection::Rejection;
use crate::types::ExternalId;

pub use hmac::digest::InvalidLength;

type HmacSha256 = Hmac<Sha256>;

/// Domain-separation key for deriving the per-bot verification key.
pub const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// Maximum distance between `auth_date` and now (24 hours).
pub const AUTH_MAX_AGE_SECS: i64 = 86_400;

/// Field carrying the hex signature.
pub const HASH_FIELD: &str = "hash";
/// Field carrying the Unix timestamp of the platform login.
pub const AUTH_DATE_FIELD: &str = "auth_date";
/// Field carrying the JSON-encoded user object.
pub const USER_FIELD: &str = "user";

/// Flat key/value view of an init-data payload.
///
/// Keys are kept sorted, which is exactly the order the check-string needs.
/// Every field is retained, including ones the application never reads,
/// because the platform signs all of them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawFields(BTreeMap<String, String>);

impl RawFields {
    /// Create an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a URL-encoded init-data string (a leading `?` is tolerated).
    #[must_use]
    pub fn from_query(raw: &str) -> Self {
        let raw = raw.trim().trim_start_matches('?');
        Self(
            url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    /// Build a field set from an already-decoded JSON object.
    ///
    /// String members are taken verbatim. Nested values (the `user` object,
    /// numbers, booleans) are re-rendered with [`platform_json`], members in
    /// the order they arrived.
    #[must_use]
    pub fn from_json(object: &Map<String, Value>) -> Self {
        Self(
            object
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => platform_json(other),
                    };
                    (key.clone(), value)
                })
                .collect(),
        )
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of fields, including `hash`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize back to a URL-encoded string.
    #[must_use]
    pub fn to_query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }

    fn check_string(&self) -> String {
        self.0
            .iter()
            .filter(|(key, _)| key.as_str() != HASH_FIELD)
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<K, V> FromIterator<(K, V)> for RawFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Compact JSON with `/` escaped as `\/`, matching the platform's own
/// rendering of nested fields in the signed payload.
struct PlatformFormatter;

impl serde_json::ser::Formatter for PlatformFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut parts = fragment.split('/');
        if let Some(first) = parts.next() {
            writer.write_all(first.as_bytes())?;
        }
        for part in parts {
            writer.write_all(b"\\/")?;
            writer.write_all(part.as_bytes())?;
        }
        Ok(())
    }
}

/// Render a nested init-data value byte-for-byte as the platform signs it.
#[must_use]
pub fn platform_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PlatformFormatter);
    // Writing a `Value` into a Vec cannot fail and only emits UTF-8
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

// Values (and the check-string built from them) must never reach logs.
impl std::fmt::Debug for RawFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFields")
            .field("keys", &self.0.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// The platform's user object embedded in the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUser {
    pub id: ExternalId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub allows_write_to_pm: bool,
}

/// A payload whose signature and freshness have been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    pub user: ExternalUser,
    pub auth_date: DateTime<Utc>,
    pub query_id: Option<String>,
}

/// Verifies init-data payloads against the bot's shared secret.
///
/// The derived key is computed once at construction; each verification
/// clones the keyed MAC state.
#[derive(Clone)]
pub struct SignatureVerifier {
    keyed: HmacSha256,
    max_age_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key", &"[REDACTED]")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl SignatureVerifier {
    /// Derive the verification key from the bot's shared secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLength` if the MAC rejects the key, which HMAC never
    /// does for any key length.
    pub fn new(shared_secret: &SecretString) -> Result<Self, InvalidLength> {
        let mut derive = HmacSha256::new_from_slice(WEB_APP_DATA_KEY)?;
        derive.update(shared_secret.expose_secret().as_bytes());
        let derived_key = derive.finalize().into_bytes();

        Ok(Self {
            keyed: HmacSha256::new_from_slice(&derived_key)?,
            max_age_secs: AUTH_MAX_AGE_SECS,
        })
    }

    /// Compute the lowercase hex hash the platform would attach to `fields`.
    ///
    /// Any existing `hash` field is ignored.
    #[must_use]
    pub fn sign(&self, fields: &RawFields) -> String {
        let mut mac = self.keyed.clone();
        mac.update(fields.check_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a payload.
    ///
    /// Checks run in a fixed order: `hash` presence, then the replay window
    /// on `auth_date`, then the signature, then decoding of the `user`
    /// object. The first failing check decides the rejection.
    ///
    /// # Errors
    ///
    /// - `PayloadMalformed` if `hash`, `auth_date` or `user` is missing or
    ///   cannot be decoded
    /// - `TemporalWindowExceeded` if `|now - auth_date|` exceeds 24 hours
    /// - `SignatureMismatch` if the hash is not lowercase hex or does not match
    pub fn verify(
        &self,
        fields: &RawFields,
        now: DateTime<Utc>,
    ) -> Result<VerifiedPayload, Rejection> {
        let hash = fields.get(HASH_FIELD).ok_or(Rejection::PayloadMalformed)?;

        let auth_ts = fields
            .get(AUTH_DATE_FIELD)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or(Rejection::PayloadMalformed)?;

        let within_window = now
            .timestamp()
            .checked_sub(auth_ts)
            .is_some_and(|skew| skew.unsigned_abs() <= self.max_age_secs.unsigned_abs());
        if !within_window {
            return Err(Rejection::TemporalWindowExceeded);
        }

        if !self.matches(fields, hash) {
            return Err(Rejection::SignatureMismatch);
        }

        let auth_date = Utc
            .timestamp_opt(auth_ts, 0)
            .single()
            .ok_or(Rejection::PayloadMalformed)?;

        let user: ExternalUser = fields
            .get(USER_FIELD)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .ok_or(Rejection::PayloadMalformed)?;

        Ok(VerifiedPayload {
            user,
            auth_date,
            query_id: fields.get("query_id").map(str::to_owned),
        })
    }

    fn matches(&self, fields: &RawFields, hash: &str) -> bool {
        // The platform emits lowercase hex only; anything else is a forgery.
        if !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return false;
        }
        let Ok(expected) = hex::decode(hash) else {
            return false;
        };

        let mut mac = self.keyed.clone();
        mac.update(fields.check_string().as_bytes());
        // Constant-time comparison
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "7342037359:AAHb0t-t0ken-f0r-Test1ng";
    const USER_JSON: &str = r#"{"id":279058397,"first_name":"Vladislav","last_name":"Kibenko","username":"vdkfrost","language_code":"ru","is_premium":true,"allows_write_to_pm":true}"#;
    const AUTH_DATE: i64 = 1_662_771_648;
    /// Reference hash for the fixture below, computed independently.
    const KNOWN_HASH: &str = "ca9f70c1d93e8379f8936aaf236c5268865d1d89f37895828451e5d91ed32694";

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(&SecretString::from(BOT_TOKEN)).unwrap()
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).single().unwrap()
    }

    fn fixture() -> RawFields {
        let mut fields: RawFields = [
            ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
            ("user", USER_JSON),
            ("auth_date", "1662771648"),
        ]
        .into_iter()
        .collect();
        fields.insert(HASH_FIELD, KNOWN_HASH);
        fields
    }

    #[test]
    fn test_sign_matches_reference_vector() {
        assert_eq!(verifier().sign(&fixture()), KNOWN_HASH);
    }

    #[test]
    fn test_verify_valid_payload() {
        let payload = verifier().verify(&fixture(), at(AUTH_DATE + 60)).unwrap();
        assert_eq!(payload.user.id, ExternalId::new(279_058_397));
        assert_eq!(payload.user.first_name, "Vladislav");
        assert_eq!(payload.user.username.as_deref(), Some("vdkfrost"));
        assert!(payload.user.is_premium);
        assert_eq!(payload.auth_date.timestamp(), AUTH_DATE);
        assert_eq!(payload.query_id.as_deref(), Some("AAHdF6IQAAAAAN0XohDhrOrc"));
    }

    #[test]
    fn test_verify_from_url_encoded_query() {
        let raw = "query_id=AAHdF6IQAAAAAN0XohDhrOrc&user=%7B%22id%22%3A279058397%2C%22first_name%22%3A%22Vladislav%22%2C%22last_name%22%3A%22Kibenko%22%2C%22username%22%3A%22vdkfrost%22%2C%22language_code%22%3A%22ru%22%2C%22is_premium%22%3Atrue%2C%22allows_write_to_pm%22%3Atrue%7D&auth_date=1662771648&hash=ca9f70c1d93e8379f8936aaf236c5268865d1d89f37895828451e5d91ed32694";
        let fields = RawFields::from_query(raw);
        assert_eq!(fields, fixture());
        assert!(verifier().verify(&fields, at(AUTH_DATE)).is_ok());
    }

    #[test]
    fn test_verify_from_json_with_nested_user_object() {
        let body = format!(
            r#"{{"query_id":"AAHdF6IQAAAAAN0XohDhrOrc","user":{USER_JSON},"auth_date":"1662771648","hash":"{KNOWN_HASH}"}}"#
        );
        let object: Map<String, Value> = serde_json::from_str(&body).unwrap();
        let fields = RawFields::from_json(&object);
        assert_eq!(fields.get(USER_FIELD), Some(USER_JSON));
        assert!(verifier().verify(&fields, at(AUTH_DATE)).is_ok());
    }

    #[test]
    fn test_nested_user_keeps_escaped_slashes() {
        let user = r#"{"id":1,"first_name":"Ada","photo_url":"https:\/\/t.me\/i\/userpic\/320\/x.svg"}"#;
        let v = verifier();
        let mut fields: RawFields = [("user", user), ("auth_date", "1662771648")]
            .into_iter()
            .collect();
        let hash = v.sign(&fields);
        fields.insert(HASH_FIELD, hash.clone());
        assert!(v.verify(&fields, at(AUTH_DATE)).is_ok());

        let body = format!(r#"{{"user":{user},"auth_date":1662771648,"hash":"{hash}"}}"#);
        let object: Map<String, Value> = serde_json::from_str(&body).unwrap();
        let from_object = RawFields::from_json(&object);
        assert_eq!(from_object.get(USER_FIELD), Some(user));
        assert_eq!(from_object.get(AUTH_DATE_FIELD), Some("1662771648"));

        let payload = v.verify(&from_object, at(AUTH_DATE)).unwrap();
        assert_eq!(
            payload.user.photo_url.as_deref(),
            Some("https://t.me/i/userpic/320/x.svg")
        );
    }

    #[test]
    fn test_platform_json_escapes_only_slashes() {
        let value = serde_json::json!({ "a": "x/y\"z", "b": [1, true, null] });
        assert_eq!(platform_json(&value), r#"{"a":"x\/y\"z","b":[1,true,null]}"#);
    }

    #[test]
    fn test_verify_is_deterministic() {
        let v = verifier();
        let fields = fixture();
        let first = v.verify(&fields, at(AUTH_DATE));
        for _ in 0..5 {
            assert_eq!(v.verify(&fields, at(AUTH_DATE)), first);
        }
    }

    #[test]
    fn test_tampering_any_field_value_fails() {
        let v = verifier();
        let original = fixture();
        for (key, value) in original.iter().filter(|(k, _)| *k != HASH_FIELD) {
            for index in 0..value.len() {
                let mut bytes = value.as_bytes().to_vec();
                bytes[index] = if bytes[index] == b'1' { b'2' } else { b'1' };
                let mut tampered = original.clone();
                tampered.insert(key, String::from_utf8(bytes).unwrap());
                let result = v.verify(&tampered, at(AUTH_DATE));
                assert!(result.is_err(), "tampering {key}[{index}] was accepted");
            }
        }
    }

    #[test]
    fn test_tampering_hash_always_fails() {
        let v = verifier();
        for index in 0..KNOWN_HASH.len() {
            for replacement in [b'0', b'f', b'F', b'g'] {
                let mut bytes = KNOWN_HASH.as_bytes().to_vec();
                if bytes[index] == replacement {
                    continue;
                }
                bytes[index] = replacement;
                let mut fields = fixture();
                fields.insert(HASH_FIELD, String::from_utf8(bytes).unwrap());
                assert_eq!(
                    v.verify(&fields, at(AUTH_DATE)),
                    Err(Rejection::SignatureMismatch)
                );
            }
        }
    }

    #[test]
    fn test_uppercase_hash_is_rejected() {
        let mut fields = fixture();
        fields.insert(HASH_FIELD, KNOWN_HASH.to_uppercase());
        assert_eq!(
            verifier().verify(&fields, at(AUTH_DATE)),
            Err(Rejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_truncated_hash_is_rejected() {
        let mut fields = fixture();
        fields.insert(HASH_FIELD, &KNOWN_HASH[..32]);
        assert_eq!(
            verifier().verify(&fields, at(AUTH_DATE)),
            Err(Rejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_unused_platform_fields_are_signed() {
        let v = verifier();
        let mut fields = fixture();
        fields.insert("chat_type", "sender");
        fields.insert(HASH_FIELD, v.sign(&fields));
        assert!(v.verify(&fields, at(AUTH_DATE)).is_ok());

        fields.remove("chat_type");
        assert_eq!(
            v.verify(&fields, at(AUTH_DATE)),
            Err(Rejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_temporal_boundary() {
        let v = verifier();
        let fields = fixture();
        assert!(v.verify(&fields, at(AUTH_DATE + AUTH_MAX_AGE_SECS)).is_ok());
        assert_eq!(
            v.verify(&fields, at(AUTH_DATE + AUTH_MAX_AGE_SECS + 1)),
            Err(Rejection::TemporalWindowExceeded)
        );
    }

    #[test]
    fn test_future_timestamp_outside_window_fails() {
        let v = verifier();
        let fields = fixture();
        assert!(v.verify(&fields, at(AUTH_DATE - AUTH_MAX_AGE_SECS)).is_ok());
        assert_eq!(
            v.verify(&fields, at(AUTH_DATE - AUTH_MAX_AGE_SECS - 1)),
            Err(Rejection::TemporalWindowExceeded)
        );
    }

    #[test]
    fn test_stale_payload_rejected_even_with_valid_signature() {
        // Window is checked before the signature
        let mut fields = fixture();
        fields.insert(HASH_FIELD, "00");
        assert_eq!(
            verifier().verify(&fields, at(AUTH_DATE + 10 * AUTH_MAX_AGE_SECS)),
            Err(Rejection::TemporalWindowExceeded)
        );
    }

    #[test]
    fn test_missing_hash_is_malformed() {
        let mut fields = fixture();
        fields.remove(HASH_FIELD);
        assert_eq!(
            verifier().verify(&fields, at(AUTH_DATE)),
            Err(Rejection::PayloadMalformed)
        );
    }

    #[test]
    fn test_missing_or_garbled_auth_date_is_malformed() {
        let v = verifier();
        let mut fields = fixture();
        fields.remove(AUTH_DATE_FIELD);
        assert_eq!(
            v.verify(&fields, at(AUTH_DATE)),
            Err(Rejection::PayloadMalformed)
        );

        fields.insert(AUTH_DATE_FIELD, "yesterday");
        assert_eq!(
            v.verify(&fields, at(AUTH_DATE)),
            Err(Rejection::PayloadMalformed)
        );
    }

    #[test]
    fn test_extreme_auth_date_does_not_overflow() {
        let mut fields = fixture();
        fields.insert(AUTH_DATE_FIELD, i64::MIN.to_string());
        assert_eq!(
            verifier().verify(&fields, at(AUTH_DATE)),
            Err(Rejection::TemporalWindowExceeded)
        );
    }

    #[test]
    fn test_signed_but_undecodable_user_is_malformed() {
        let v = verifier();
        let mut fields = fixture();
        fields.insert(USER_FIELD, "{not json");
        fields.insert(HASH_FIELD, v.sign(&fields));
        assert_eq!(
            v.verify(&fields, at(AUTH_DATE)),
            Err(Rejection::PayloadMalformed)
        );
    }

    #[test]
    fn test_different_secret_fails() {
        let other = SignatureVerifier::new(&SecretString::from("999:other-token")).unwrap();
        assert_eq!(
            other.verify(&fixture(), at(AUTH_DATE)),
            Err(Rejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let v = verifier();
        let debug = format!("{v:?} {:?}", fixture());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(BOT_TOKEN));
        assert!(!debug.contains(KNOWN_HASH));
        assert!(!debug.contains("Vladislav"));
    }
}
