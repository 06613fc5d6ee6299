//! PKCE (Proof Key for Code Exchange) material for the browser login flow.
//!
//! Generates the code verifier, its S256 challenge, and the anti-forgery
//! `state` parameter that together bind one authorization attempt to this
//! process. All three values are single-use: a new [`PkceExchange`] is
//! created per login attempt and dropped with it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Verifier entropy in bytes. 32 bytes encodes to a 43-character base64url
/// string, the minimum length RFC 7636 permits.
const VERIFIER_LENGTH: usize = 32;

/// Anti-forgery state entropy in bytes, rendered as hex.
const STATE_LENGTH: usize = 16;

/// PKCE challenge method. Only S256 is supported.
pub const CHALLENGE_METHOD: &str = "S256";

/// Single-use PKCE material for one authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceExchange {
    /// The code verifier (secret, sent only during token exchange).
    pub verifier: String,

    /// The code challenge: base64url(SHA-256(verifier)), unpadded.
    /// Sent in the authorization URL.
    pub challenge: String,

    /// Anti-forgery state value, compared exactly against the callback.
    pub state: String,
}

impl PkceExchange {
    /// Generate fresh PKCE material from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let verifier_bytes: [u8; VERIFIER_LENGTH] = rng.gen();
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = compute_challenge(&verifier);

        let mut state_bytes = [0u8; STATE_LENGTH];
        rng.fill(&mut state_bytes);
        let state = hex::encode(state_bytes);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    /// Validate that a callback's state matches this attempt's state.
    ///
    /// Comparison is exact; any mismatch must abort the exchange.
    #[must_use]
    pub fn validate_state(&self, received: &str) -> bool {
        self.state == received
    }
}

/// Derive the S256 challenge for a verifier.
///
/// Deterministic: the same verifier always yields the same challenge.
pub fn compute_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_length_and_alphabet() {
        let pkce = PkceExchange::generate();
        // 32 bytes base64url encoded = 43 characters
        assert_eq!(pkce.verifier.len(), 43);
        assert!(
            pkce.verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "verifier contains non-URL-safe characters: {}",
            pkce.verifier
        );
    }

    #[test]
    fn test_challenge_matches_manual_derivation() {
        let pkce = PkceExchange::generate();

        let mut hasher = Sha256::new();
        hasher.update(pkce.verifier.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());

        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn test_challenge_deterministic_and_unpadded() {
        // Fixed verifier -> fixed challenge, every run.
        let c1 = compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        let c2 = compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(c1, c2);
        assert!(!c1.contains('='));
        assert!(!c1.contains('+'));
        assert!(!c1.contains('/'));
    }

    #[test]
    fn test_state_is_hex() {
        let pkce = PkceExchange::generate();
        // 16 bytes hex encoded = 32 characters
        assert_eq!(pkce.state.len(), 32);
        assert!(pkce.state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_validate_state() {
        let pkce = PkceExchange::generate();
        let received = pkce.state.clone();
        assert!(pkce.validate_state(&received));
        assert!(!pkce.validate_state("wrong_state"));
        assert!(!pkce.validate_state(""));
    }

    #[test]
    fn test_unique_generation() {
        let a = PkceExchange::generate();
        let b = PkceExchange::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.state, b.state);
    }
}
