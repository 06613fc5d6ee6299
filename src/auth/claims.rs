//! JWT claim reader: decode, never verify.
//!
//! Pulls `tid`, the user principal, and `exp` out of a compact JWT this
//! process itself just received over TLS from the token endpoint.
//!
//! This is a parsing convenience, not a security boundary. No signature or
//! audience checking happens here, so callers must never feed it a token
//! handed over by an untrusted third party and treat the result as
//! authenticated.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

/// Decode the claims (payload) segment of a compact JWT.
///
/// Splits on `.`, base64url-decodes the middle segment and parses it as a
/// JSON object. Standard-alphabet input (`+`, `/`) and padded input are
/// normalized before decoding.
///
/// Returns `None` if the token has fewer than three segments or the payload
/// is not valid base64/JSON.
#[must_use]
pub fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?; // signature must be present, even though it is ignored

    let normalized = payload
        .replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_string();

    let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Tenant ID (`tid`) claim.
#[must_use]
pub fn tenant_id(claims: &Map<String, Value>) -> Option<String> {
    claims
        .get("tid")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// User principal, in the order Azure AD populates it:
/// `upn`, then `unique_name`, then `preferred_username`.
#[must_use]
pub fn user_principal(claims: &Map<String, Value>) -> Option<String> {
    ["upn", "unique_name", "preferred_username"]
        .iter()
        .find_map(|key| claims.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Expiry (`exp`) claim as a unix timestamp.
#[must_use]
pub fn expiry(claims: &Map<String, Value>) -> Option<i64> {
    claims.get("exp").and_then(Value::as_i64)
}

/// Expiry of a raw token, for callers that don't need the other claims.
#[must_use]
pub fn token_expiry(token: &str) -> Option<i64> {
    decode_claims(token).as_ref().and_then(expiry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    fn make_jwt(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn test_round_trip() {
        let token = make_jwt(&serde_json::json!({
            "tid": "tenant-x",
            "upn": "a@b.com",
            "exp": 1_900_000_000i64,
        }));

        let claims = decode_claims(&token).expect("claims decode");
        assert_eq!(tenant_id(&claims).as_deref(), Some("tenant-x"));
        assert_eq!(user_principal(&claims).as_deref(), Some("a@b.com"));
        assert_eq!(expiry(&claims), Some(1_900_000_000));
    }

    #[test]
    fn test_standard_alphabet_with_padding() {
        // A payload whose standard-base64 form carries padding and `+`/`/`.
        let payload = serde_json::json!({"upn": "x@y.org", "blob": "????>>>"});
        let header = STANDARD.encode(br#"{"alg":"RS256"}"#);
        let body = STANDARD.encode(payload.to_string());
        let token = format!("{header}.{body}.sig");

        let claims = decode_claims(&token).expect("padded payload decodes");
        assert_eq!(user_principal(&claims).as_deref(), Some("x@y.org"));
    }

    #[test]
    fn test_principal_fallback_order() {
        let claims =
            decode_claims(&make_jwt(&serde_json::json!({"unique_name": "legacy@b.com"})))
                .unwrap();
        assert_eq!(user_principal(&claims).as_deref(), Some("legacy@b.com"));

        let claims = decode_claims(&make_jwt(
            &serde_json::json!({"preferred_username": "pref@b.com"}),
        ))
        .unwrap();
        assert_eq!(user_principal(&claims).as_deref(), Some("pref@b.com"));

        let claims = decode_claims(&make_jwt(&serde_json::json!({
            "upn": "upn@b.com",
            "preferred_username": "pref@b.com",
        })))
        .unwrap();
        assert_eq!(user_principal(&claims).as_deref(), Some("upn@b.com"));
    }

    #[test]
    fn test_malformed_tokens_are_absent() {
        assert!(decode_claims("").is_none());
        assert!(decode_claims("only-one-segment").is_none());
        assert!(decode_claims("two.segments").is_none());
        assert!(decode_claims("a.!!!not-base64!!!.c").is_none());

        // Valid base64 but not JSON
        let bad = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"not json"));
        assert!(decode_claims(&bad).is_none());

        // Valid JSON but not an object
        let bad = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"[1,2,3]"));
        assert!(decode_claims(&bad).is_none());
    }

    #[test]
    fn test_token_expiry() {
        let token = make_jwt(&serde_json::json!({"exp": 12345}));
        assert_eq!(token_expiry(&token), Some(12345));
        assert_eq!(token_expiry("garbage"), None);
    }
}
