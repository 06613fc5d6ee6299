//! Azure AD v2.0 endpoint client.
//!
//! Thin wrapper over the identity provider's `/devicecode` and `/token`
//! endpoints covering the three grant shapes this tool uses:
//! `authorization_code` (+ PKCE verifier), the RFC 8628 device-code grant,
//! and `refresh_token`. Any OAuth2-compliant provider with equivalent
//! endpoints satisfies the contract; tests point [`OAuthConfig::authority`]
//! at a local mock server.

use serde::Deserialize;

use crate::auth::error::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Microsoft identity platform v2.0 authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Multi-tenant wildcard, used until a login resolves the real tenant.
pub const COMMON_TENANT: &str = "common";

/// Power Platform management API resource, the default login audience.
pub const POWER_PLATFORM_RESOURCE: &str = "https://api.bap.microsoft.com";

/// Azure CLI's well-known public client ID. Lets the tool work with zero
/// configuration; override per profile for a registered app.
pub const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Grant type for device code token exchange (RFC 8628).
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

// =============================================================================
// OAuth error codes (RFC 8628 §3.5)
// =============================================================================

/// User has not yet authorized; keep polling.
pub const ERROR_AUTHORIZATION_PENDING: &str = "authorization_pending";

/// Polling too fast; increase the interval.
pub const ERROR_SLOW_DOWN: &str = "slow_down";

/// User denied the authorization.
pub const ERROR_ACCESS_DENIED: &str = "access_denied";

/// Device code expired before approval.
pub const ERROR_EXPIRED_TOKEN: &str = "expired_token";

/// Refresh token is dead; the stored profile must be invalidated.
pub const ERROR_INVALID_GRANT: &str = "invalid_grant";

// =============================================================================
// Configuration and response shapes
// =============================================================================

/// Identity provider coordinates for one client.
///
/// Passed explicitly into the broker and flow engines; there is no
/// module-level mutable state.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Authority base URL, without a trailing slash.
    pub authority: String,
    /// Public client (application) ID.
    pub client_id: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Success response from the `/token` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error response from the `/token` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Response from the `/devicecode` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    /// Opaque code, sent only back to the token endpoint.
    pub device_code: String,
    /// Short human-readable code the user types in.
    pub user_code: String,
    pub verification_uri: String,
    /// Initial poll interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Lifetime of the device code in seconds.
    pub expires_in: u64,
    /// Provider-supplied instruction text, if any.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// Scope string granting access to one resource plus a refresh token.
pub fn resource_scope(resource: &str) -> String {
    format!("{}/.default offline_access", resource.trim_end_matches('/'))
}

/// Shortened token preview for logs. Never log a full token.
pub(crate) fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        "********".to_string()
    } else {
        format!("{}…({} chars)", &token[..8], token.len())
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client bound to one identity provider + client ID.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl IdentityClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// `GET {authority}/{tenant}/oauth2/v2.0/authorize` base URL.
    /// Query parameters are appended by the browser flow.
    pub fn authorize_endpoint(&self, tenant: &str) -> String {
        format!(
            "{}/{tenant}/oauth2/v2.0/authorize",
            self.config.authority.trim_end_matches('/')
        )
    }

    fn token_endpoint(&self, tenant: &str) -> String {
        format!(
            "{}/{tenant}/oauth2/v2.0/token",
            self.config.authority.trim_end_matches('/')
        )
    }

    fn devicecode_endpoint(&self, tenant: &str) -> String {
        format!(
            "{}/{tenant}/oauth2/v2.0/devicecode",
            self.config.authority.trim_end_matches('/')
        )
    }

    /// Initiate a device-code session.
    pub async fn request_device_code(&self, tenant: &str, scope: &str) -> Result<DeviceCodeResponse> {
        tracing::debug!(tenant, scope, "requesting device code");
        let response = self
            .http
            .post(self.devicecode_endpoint(tenant))
            .form(&[("client_id", self.config.client_id.as_str()), ("scope", scope)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(parse_provider_error(status, &body))
        }
    }

    /// One poll of the token endpoint with the device-code grant.
    ///
    /// Non-terminal conditions (`authorization_pending`, `slow_down`) come
    /// back as [`Error::Provider`] for the flow engine to classify.
    pub async fn redeem_device_code(&self, tenant: &str, device_code: &str) -> Result<TokenResponse> {
        self.send_token_request(
            tenant,
            &[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", self.config.client_id.as_str()),
                ("device_code", device_code),
            ],
        )
        .await
    }

    /// Exchange an authorization code using the PKCE verifier (never the
    /// challenge) and the exact redirect URI used on the authorize request.
    pub async fn exchange_code(
        &self,
        tenant: &str,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<TokenResponse> {
        tracing::debug!(tenant, redirect_uri, "exchanging authorization code");
        self.send_token_request(
            tenant,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", redirect_uri),
                ("scope", scope),
            ],
        )
        .await
    }

    /// Redeem a refresh token for a resource-scoped access token.
    pub async fn refresh(&self, tenant: &str, refresh_token: &str, scope: &str) -> Result<TokenResponse> {
        tracing::debug!(
            tenant,
            scope,
            refresh_token = %mask_token(refresh_token),
            "refreshing access token"
        );
        self.send_token_request(
            tenant,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", scope),
            ],
        )
        .await
    }

    async fn send_token_request(&self, tenant: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.token_endpoint(tenant))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(parse_provider_error(status, &body))
        }
    }
}

/// Map a non-success token/devicecode response onto [`Error::Provider`],
/// keeping the provider's `error` and `error_description` verbatim.
fn parse_provider_error(status: reqwest::StatusCode, body: &str) -> Error {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) => Error::provider(err.error, err.error_description.unwrap_or_default()),
        Err(_) => Error::provider(
            format!("http_{}", status.as_u16()),
            body.chars().take(300).collect::<String>(),
        ),
    }
}
