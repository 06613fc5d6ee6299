//! Process-scoped access-token cache.
//!
//! Memoizes access tokens by resource for the lifetime of one CLI
//! invocation so repeated calls against the same resource don't re-hit the
//! token endpoint. Entries live only in memory: a crashed process can never
//! leave a replayable access token on disk, and every invocation starts
//! cold apart from what it re-derives from the profile store.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::auth::claims;

/// Safety margin before expiry, in seconds. A token with less than this
/// much validity left is treated as absent so it can't expire mid-request.
pub const EXPIRY_MARGIN_SECS: i64 = 120;

/// In-memory, resource-keyed access-token cache.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: Mutex<HashMap<String, String>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a token for `resource`.
    ///
    /// Returns the token only if its `exp` claim is more than
    /// [`EXPIRY_MARGIN_SECS`] in the future; otherwise the entry is treated
    /// as absent, forcing the broker to refresh.
    pub fn get(&self, resource: &str) -> Option<String> {
        let key = cache_key(resource);
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let token = entries.get(&key)?;

        let exp = claims::token_expiry(token)?;
        let now = chrono::Utc::now().timestamp();
        if exp - now > EXPIRY_MARGIN_SECS {
            Some(token.clone())
        } else {
            tracing::debug!(resource, "cached token near expiry, discarding");
            None
        }
    }

    /// Store a token for `resource`, overwriting any prior entry.
    pub fn put(&self, resource: &str, token: impl Into<String>) {
        let key = cache_key(resource);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, token.into());
    }

    /// Drop every cached token.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

/// Normalize a resource identifier into a stable cache key.
///
/// Case-folded, with every run of non-alphanumeric characters collapsed to a
/// single `-`, so `https://api.bap.microsoft.com/` and
/// `HTTPS://API.BAP.MICROSOFT.COM` share one entry.
pub fn cache_key(resource: &str) -> String {
    let mut key = String::with_capacity(resource.len());
    let mut last_was_sep = true;
    for c in resource.chars() {
        if c.is_ascii_alphanumeric() {
            key.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            key.push('-');
            last_was_sep = true;
        }
    }
    key.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp }).to_string());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn test_cache_key_normalization() {
        assert_eq!(
            cache_key("https://api.bap.microsoft.com/"),
            "https-api-bap-microsoft-com"
        );
        assert_eq!(
            cache_key("HTTPS://API.BAP.MICROSOFT.COM"),
            "https-api-bap-microsoft-com"
        );
        assert_eq!(cache_key("plain"), "plain");
    }

    #[test]
    fn test_expiry_boundary() {
        let cache = TokenCache::new();
        let now = chrono::Utc::now().timestamp();

        // 121 seconds of validity left: returned.
        cache.put("res", token_with_exp(now + EXPIRY_MARGIN_SECS + 1));
        assert!(cache.get("res").is_some());

        // 119 seconds left: treated as absent.
        cache.put("res", token_with_exp(now + EXPIRY_MARGIN_SECS - 1));
        assert!(cache.get("res").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = TokenCache::new();
        let now = chrono::Utc::now().timestamp();
        let first = token_with_exp(now + 3600);
        let second = token_with_exp(now + 7200);

        cache.put("res", first);
        cache.put("res", second.clone());
        assert_eq!(cache.get("res").as_deref(), Some(second.as_str()));
    }

    #[test]
    fn test_unparseable_token_is_absent() {
        let cache = TokenCache::new();
        cache.put("res", "not-a-jwt");
        assert!(cache.get("res").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = TokenCache::new();
        let now = chrono::Utc::now().timestamp();
        cache.put("a", token_with_exp(now + 3600));
        cache.put("b", token_with_exp(now + 3600));
        cache.clear();
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_resources_are_independent() {
        let cache = TokenCache::new();
        let now = chrono::Utc::now().timestamp();
        let token = token_with_exp(now + 3600);
        cache.put("https://api.example.com", token);
        assert!(cache.get("https://other.example.com").is_none());
    }
}
