//! Error types for the authentication subsystem.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring or persisting tokens.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication-related errors.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Protocol error returned by the identity provider.
    ///
    /// `code` and `description` are surfaced verbatim from the provider's
    /// `error` / `error_description` response fields.
    #[error("Provider error ({code}): {description}")]
    Provider {
        /// OAuth2 error code (e.g. `invalid_grant`, `access_denied`).
        code: String,
        /// Human-readable description from the provider.
        description: String,
    },

    /// Network/HTTP errors.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Profile store errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a provider protocol error.
    pub fn provider(code: impl Into<String>, description: impl Into<String>) -> Self {
        Error::Provider {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Check if this is the provider's `invalid_grant` error.
    ///
    /// `invalid_grant` means the refresh token is dead and the stored
    /// profile must be invalidated.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Error::Provider { code, .. } if code == "invalid_grant")
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Get the provider error code if this is a protocol error.
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            Error::Provider { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

/// Authentication-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid credentials are stored for the active profile.
    #[error("Not authenticated - run `ppctl login` first")]
    NotAuthenticated,

    /// Callback state parameter did not match the expected value.
    ///
    /// Treated as fatal for the attempt: a mismatch could indicate a
    /// request forgery against the local listener.
    #[error("OAuth state mismatch - possible CSRF, aborting login")]
    StateMismatch,

    /// The callback did not include an authorization code.
    #[error("Callback did not carry an authorization code")]
    MissingCode,

    /// No authorization code arrived within the callback wait window.
    #[error("Timed out waiting for the browser callback - retry with --device-code")]
    CallbackTimeout,

    /// No free loopback port could be found for the redirect listener.
    #[error("No free local port for the login callback - retry with --device-code")]
    PortExhausted,

    /// The user declined the device-code authorization.
    #[error("Authorization was denied")]
    AccessDenied,

    /// The device code expired before the user approved it.
    #[error("Device code expired before approval - run login again")]
    DeviceCodeExpired,

    /// The device-code poll loop exceeded its safety limit.
    #[error("Device authorization never reached a terminal state")]
    PollLimitExceeded,

    /// An access token could not be parsed as a compact JWT.
    #[error("Malformed access token")]
    MalformedToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("no client id configured");
        assert_eq!(
            err.to_string(),
            "Configuration error: no client id configured"
        );

        let err = Error::provider("invalid_grant", "AADSTS70000: refresh token revoked");
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.is_invalid_grant());
        assert_eq!(err.provider_code(), Some("invalid_grant"));
    }

    #[test]
    fn test_auth_error() {
        let err = Error::Auth(AuthError::NotAuthenticated);
        assert!(err.is_auth_error());
        assert!(!err.is_invalid_grant());
    }

    #[test]
    fn test_state_mismatch_is_not_invalid_grant() {
        let err = Error::Auth(AuthError::StateMismatch);
        assert!(err.provider_code().is_none());
    }
}
