//! Client-side JWT inspection
//!
//! Signatures are never verified here. The decoded payload only feeds
//! expiry and fingerprint heuristics; authorization stays with the backend.
//! Every check degrades to `None`/`false` instead of returning an error.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// Refresh window used by [`TokenValidator::validate_token`]
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Tokens older than this are treated as suspicious
const MAX_TOKEN_AGE_MINUTES: i64 = 24 * 60;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(segment)
        .or_else(|_| STANDARD_LENIENT.decode(segment))
        .ok()
}

/// Three non-empty segments, each valid base64
pub(crate) fn has_valid_structure(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && decode_segment(part).is_some())
}

/// Decoded, read-only view of a JWT payload
///
/// Fields are `None` when absent or of the wrong JSON type.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPayload {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub subscription_tier: Option<String>,
    /// Issued-at, epoch seconds
    pub iat: Option<i64>,
    /// Expiry, epoch seconds
    pub exp: Option<i64>,
    /// `access` or `refresh` when present
    pub token_type: Option<String>,
}

impl TokenPayload {
    fn from_claims(claims: &Map<String, JsonValue>) -> Self {
        let string = |key: &str| claims.get(key).and_then(JsonValue::as_str).map(str::to_owned);
        let number = |key: &str| {
            claims
                .get(key)
                .and_then(|v| {
                    v.as_i64()
                        .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                })
        };

        Self {
            user_id: string("userId"),
            email: string("email"),
            role: string("role"),
            subscription_tier: string("subscriptionTier"),
            iat: number("iat"),
            exp: number("exp"),
            token_type: string("type"),
        }
    }

    /// `exp` in epoch milliseconds, saturating at the `i64` bounds
    pub fn exp_millis(&self) -> Option<i64> {
        self.exp.map(|exp| exp.saturating_mul(1000))
    }

    /// `iat` in epoch milliseconds, saturating at the `i64` bounds
    pub fn iat_millis(&self) -> Option<i64> {
        self.iat.map(|iat| iat.saturating_mul(1000))
    }

    /// All required claims present with the right primitive type
    pub fn has_required_claims(&self) -> bool {
        self.user_id.is_some()
            && self.email.is_some()
            && self.role.is_some()
            && self.subscription_tier.is_some()
            && self.iat.is_some()
            && self.exp.is_some()
    }
}

/// Outcome of [`TokenValidator::validate_token`]
///
/// Malformed tokens report `is_expired = true`; callers do not distinguish
/// the two cases.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub is_expired: bool,
    pub needs_refresh: bool,
    pub payload: Option<TokenPayload>,
    pub errors: Vec<String>,
}

impl TokenValidation {
    fn rejected(error: &str) -> Self {
        Self {
            is_valid: false,
            is_expired: true,
            needs_refresh: false,
            payload: None,
            errors: vec![error.to_string()],
        }
    }
}

/// Stateless JWT inspector
#[derive(Clone)]
pub struct TokenValidator {
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Decode the payload segment without verifying the signature
    ///
    /// All three segments must be valid base64.
    pub fn decode_token(&self, token: &str) -> Option<TokenPayload> {
        if !has_valid_structure(token) {
            return None;
        }

        let payload = token.split('.').nth(1)?;
        let bytes = decode_segment(payload)?;
        let claims: JsonValue = serde_json::from_slice(&bytes).ok()?;
        claims.as_object().map(TokenPayload::from_claims)
    }

    /// True when undecodable, missing `exp`, or past `exp`
    pub fn is_token_expired(&self, token: &str) -> bool {
        match self.decode_token(token).and_then(|p| p.exp_millis()) {
            Some(exp_ms) => exp_ms <= self.clock.now_millis(),
            None => true,
        }
    }

    /// Milliseconds until `exp`; 0 if undecodable, negative once expired
    pub fn time_until_expiry(&self, token: &str) -> i64 {
        self.decode_token(token)
            .and_then(|p| p.exp_millis())
            .map(|exp_ms| exp_ms.saturating_sub(self.clock.now_millis()))
            .unwrap_or(0)
    }

    /// True iff the token expires within `threshold` but has not expired yet
    pub fn needs_refresh(&self, token: &str, threshold: Duration) -> bool {
        let remaining = self.time_until_expiry(token);
        remaining > 0 && (remaining as u128) < threshold.as_millis()
    }

    pub fn is_valid_token_structure(&self, token: &str) -> bool {
        has_valid_structure(token)
    }

    pub fn is_valid_token_payload(&self, token: &str) -> bool {
        self.is_valid_token_structure(token)
            && self
                .decode_token(token)
                .is_some_and(|payload| payload.has_required_claims())
    }

    pub fn validate_token(&self, token: &str) -> TokenValidation {
        if !self.is_valid_token_structure(token) {
            return TokenValidation::rejected("Invalid token structure");
        }
        if !self.is_valid_token_payload(token) {
            return TokenValidation::rejected("Invalid token payload");
        }

        let payload = self.decode_token(token);
        let is_expired = self.is_token_expired(token);
        let needs_refresh = self.needs_refresh(token, DEFAULT_REFRESH_THRESHOLD);

        let mut errors = Vec::new();
        if is_expired {
            errors.push("Token expired".to_string());
        }

        TokenValidation {
            is_valid: payload.is_some() && !is_expired,
            is_expired,
            needs_refresh,
            payload,
            errors,
        }
    }

    /// Weak, non-cryptographic hash of `userId-email-iat`, base-36 encoded
    pub fn token_fingerprint(&self, token: &str) -> Option<String> {
        let payload = self.decode_token(token)?;
        let source = format!(
            "{}-{}-{}",
            payload.user_id.unwrap_or_default(),
            payload.email.unwrap_or_default(),
            payload.iat.map(|iat| iat.to_string()).unwrap_or_default(),
        );

        let hash = source
            .encode_utf16()
            .fold(0i32, |hash, unit| {
                hash.wrapping_shl(5)
                    .wrapping_sub(hash)
                    .wrapping_add(i32::from(unit))
            });

        Some(to_base36(hash.unsigned_abs()))
    }

    /// Same `userId` and `iat` in both tokens
    pub fn is_same_session(&self, a: &str, b: &str) -> bool {
        match (self.decode_token(a), self.decode_token(b)) {
            (Some(a), Some(b)) => {
                a.user_id.is_some() && a.iat.is_some() && a.user_id == b.user_id && a.iat == b.iat
            }
            _ => false,
        }
    }

    /// Whole minutes since `iat`
    pub fn token_age_minutes(&self, token: &str) -> Option<i64> {
        let iat_ms = self.decode_token(token)?.iat_millis()?;
        Some(self.clock.now_millis().saturating_sub(iat_ms) / 60_000)
    }

    pub fn is_suspicious_token(&self, token: &str) -> bool {
        let validation = self.validate_token(token);
        if !validation.is_valid {
            return true;
        }

        let too_old = self
            .token_age_minutes(token)
            .map_or(true, |age| age > MAX_TOKEN_AGE_MINUTES);

        let unknown_type = validation
            .payload
            .and_then(|p| p.token_type)
            .is_some_and(|kind| kind != "access" && kind != "refresh");

        too_old || unknown_type
    }
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_token, standard_claims, ManualClock, NOW_MS};
    use serde_json::json;

    fn validator() -> TokenValidator {
        TokenValidator::new(Arc::new(ManualClock::new(NOW_MS)))
    }

    fn token_expiring_in(secs: i64) -> String {
        make_token(standard_claims("u1", "STUDENT", NOW_MS / 1000 - 60, NOW_MS / 1000 + secs))
    }

    #[test]
    fn future_exp_is_not_expired() {
        let v = validator();
        let token = token_expiring_in(3600);
        assert!(!v.is_token_expired(&token));
        assert_eq!(v.time_until_expiry(&token), 3_600_000);
    }

    #[test]
    fn past_exp_is_expired() {
        let v = validator();
        assert!(v.is_token_expired(&token_expiring_in(-1)));
    }

    #[test]
    fn malformed_tokens_decode_to_none_and_count_as_expired() {
        let v = validator();
        for token in ["", "abc", "a.b", "a.b.c.d", "x.!!!.y", "e30.bm90LWpzb24.c2ln"] {
            assert!(v.decode_token(token).is_none(), "{token}");
            assert!(v.is_token_expired(token), "{token}");
            assert_eq!(v.time_until_expiry(token), 0);
        }

        // A decodable payload does not rescue a broken header or signature
        let valid = token_expiring_in(3600);
        let payload = valid.split('.').nth(1).unwrap();
        for token in [
            format!("!!!.{payload}.c2ln"),
            format!("e30.{payload}.$$$"),
            format!(".{payload}.c2ln"),
            format!("e30.{payload}."),
        ] {
            assert!(!v.is_valid_token_structure(&token), "{token}");
            assert!(v.decode_token(&token).is_none(), "{token}");
            assert!(v.is_token_expired(&token), "{token}");
        }
    }

    #[test]
    fn extreme_claim_values_never_panic() {
        let v = validator();
        let now = NOW_MS / 1000;

        let far_future = make_token(standard_claims("u1", "STUDENT", now - 60, i64::MAX / 1000 + 1));
        assert!(!v.is_token_expired(&far_future));
        assert!(v.time_until_expiry(&far_future) > 0);
        assert!(!v.needs_refresh(&far_future, DEFAULT_REFRESH_THRESHOLD));
        assert!(v.validate_token(&far_future).is_valid);

        let mut claims = standard_claims("u1", "STUDENT", now - 60, 0);
        claims["exp"] = json!(1e300);
        let float_exp = make_token(claims);
        assert!(!v.is_token_expired(&float_exp));
        assert!(v.validate_token(&float_exp).is_valid);

        let far_past = make_token(standard_claims("u1", "STUDENT", i64::MIN, i64::MIN));
        assert!(v.is_token_expired(&far_past));
        assert!(v.time_until_expiry(&far_past) < 0);
        assert!(v.token_age_minutes(&far_past).is_some_and(|age| age > 0));
        assert!(v.is_suspicious_token(&far_past));
    }

    #[test]
    fn needs_refresh_only_inside_window() {
        let v = validator();
        assert!(v.needs_refresh(&token_expiring_in(120), DEFAULT_REFRESH_THRESHOLD));
        assert!(!v.needs_refresh(&token_expiring_in(600), DEFAULT_REFRESH_THRESHOLD));
        assert!(!v.needs_refresh(&token_expiring_in(-10), DEFAULT_REFRESH_THRESHOLD));
    }

    #[test]
    fn payload_shape_is_checked() {
        let v = validator();
        assert!(v.is_valid_token_payload(&token_expiring_in(60)));

        let wrong_type = make_token(json!({
            "userId": 42,
            "email": "a@b.fr",
            "role": "STUDENT",
            "subscriptionTier": "FREE",
            "iat": 1,
            "exp": 2,
        }));
        assert!(v.is_valid_token_structure(&wrong_type));
        assert!(!v.is_valid_token_payload(&wrong_type));
        assert!(v.decode_token(&wrong_type).is_some());
    }

    #[test]
    fn validate_token_reports_composite_state() {
        let v = validator();

        let fresh = v.validate_token(&token_expiring_in(3600));
        assert!(fresh.is_valid);
        assert!(!fresh.is_expired);
        assert!(!fresh.needs_refresh);
        assert!(fresh.errors.is_empty());

        let expired = v.validate_token(&token_expiring_in(-3600));
        assert!(!expired.is_valid);
        assert!(expired.is_expired);
        assert_eq!(expired.errors, vec!["Token expired".to_string()]);

        let garbage = v.validate_token("not-a-token");
        assert!(!garbage.is_valid);
        assert!(garbage.is_expired);
        assert!(!garbage.needs_refresh);
        assert!(garbage.payload.is_none());
    }

    #[test]
    fn validate_token_is_idempotent() {
        let v = validator();
        let token = token_expiring_in(200);
        assert_eq!(v.validate_token(&token), v.validate_token(&token));
    }

    #[test]
    fn fingerprint_is_deterministic_and_identity_based() {
        let v = validator();
        let a = make_token(standard_claims("u1", "STUDENT", 1000, 2000));
        let b = make_token(standard_claims("u1", "STUDENT", 1000, 9000));
        let c = make_token(standard_claims("u2", "STUDENT", 1000, 2000));

        let fa = v.token_fingerprint(&a).unwrap();
        assert_eq!(Some(fa.clone()), v.token_fingerprint(&a));
        assert_eq!(Some(fa.clone()), v.token_fingerprint(&b));
        assert_ne!(Some(fa), v.token_fingerprint(&c));
        assert!(v.token_fingerprint("junk").is_none());
    }

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u32::MAX), "1z141z3");
    }

    #[test]
    fn same_session_compares_user_and_iat() {
        let v = validator();
        let a = make_token(standard_claims("u1", "STUDENT", 1000, 2000));
        let b = make_token(standard_claims("u1", "ADMIN", 1000, 5000));
        let c = make_token(standard_claims("u1", "STUDENT", 1001, 2000));
        assert!(v.is_same_session(&a, &b));
        assert!(!v.is_same_session(&a, &c));
        assert!(!v.is_same_session(&a, "junk"));
    }

    #[test]
    fn suspicious_tokens() {
        let v = validator();
        let now = NOW_MS / 1000;

        assert!(!v.is_suspicious_token(&token_expiring_in(600)));
        assert!(v.is_suspicious_token("junk"));

        let old = make_token(standard_claims("u1", "STUDENT", now - 25 * 3600, now + 600));
        assert_eq!(v.token_age_minutes(&old), Some(25 * 60));
        assert!(v.is_suspicious_token(&old));

        let mut claims = standard_claims("u1", "STUDENT", now - 60, now + 600);
        claims["type"] = json!("impersonation");
        assert!(v.is_suspicious_token(&make_token(claims)));

        let mut claims = standard_claims("u1", "STUDENT", now - 60, now + 600);
        claims["type"] = json!("refresh");
        assert!(!v.is_suspicious_token(&make_token(claims)));
    }
}
