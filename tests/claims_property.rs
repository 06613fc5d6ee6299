//! Property coverage for the JWT claim reader.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use proptest::prelude::*;

use ppctl::auth::claims;

proptest! {
    /// Any three-segment JWT with a {tid, upn, exp} payload decodes back to
    /// exactly those values, whichever base64 alphabet/padding produced it.
    #[test]
    fn decode_round_trips(
        tid in "[a-z0-9-]{1,36}",
        upn in "[a-z0-9.]{1,16}@[a-z0-9]{1,12}\\.[a-z]{2,4}",
        exp in 0i64..4_102_444_800i64,
        standard_alphabet in any::<bool>(),
    ) {
        let payload = serde_json::json!({ "tid": tid, "upn": upn, "exp": exp }).to_string();
        let (header, body) = if standard_alphabet {
            (STANDARD.encode(br#"{"alg":"RS256"}"#), STANDARD.encode(&payload))
        } else {
            (URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#), URL_SAFE_NO_PAD.encode(&payload))
        };
        let token = format!("{header}.{body}.signature");

        let decoded = claims::decode_claims(&token).expect("valid JWT decodes");
        let tenant = claims::tenant_id(&decoded);
        prop_assert_eq!(tenant.as_deref(), Some(tid.as_str()));
        let principal = claims::user_principal(&decoded);
        prop_assert_eq!(principal.as_deref(), Some(upn.as_str()));
        prop_assert_eq!(claims::expiry(&decoded), Some(exp));
    }

    /// Garbage never panics; it only comes back absent.
    #[test]
    fn arbitrary_input_never_panics(input in ".{0,200}") {
        let _ = claims::decode_claims(&input);
    }
}
