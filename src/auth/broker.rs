//! Access token broker.
//!
//! The single entry point consumers call to get a bearer token for a
//! resource. Attempts, short-circuiting on first success:
//!
//! 1. Session cache (process-scoped, resource-keyed).
//! 2. Stored refresh token → refresh grant; rotated refresh tokens are
//!    persisted back under the profile lock, `invalid_grant` evicts the
//!    profile.
//! 3. External credential sources (other sanctioned local tools), in order.
//!
//! The broker never starts an interactive flow. When everything fails it
//! returns [`AuthError::NotAuthenticated`] and the caller decides whether
//! to prompt for a login — a token fetch that silently pops a browser would
//! be surprising.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::cache::TokenCache;
use crate::auth::claims;
use crate::auth::endpoints::{
    mask_token, resource_scope, IdentityClient, TokenResponse, COMMON_TENANT,
};
use crate::auth::error::{AuthError, Result};
use crate::auth::store::{ProfileRecord, ProfileStore};

/// A local, already-sanctioned credential provider the broker can fall back
/// to (an installed CLI with its own login session, typically).
///
/// Fallbacks exist for interoperability only; they are never the primary
/// path. New providers plug in here without touching broker control flow.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name for logs and error messages.
    fn name(&self) -> &str;

    /// Cheap availability probe (binary on PATH, config file present).
    fn available(&self) -> bool;

    /// Try to mint a token for `resource`. `Ok(None)` means "this source
    /// can't help", which moves the chain along without an error.
    async fn try_get_token(&self, resource: &str) -> Result<Option<String>>;
}

/// Azure CLI (`az account get-access-token`) credential source.
#[derive(Debug, Default)]
pub struct AzureCliSource;

#[async_trait]
impl CredentialSource for AzureCliSource {
    fn name(&self) -> &str {
        "azure-cli"
    }

    fn available(&self) -> bool {
        which::which("az").is_ok()
    }

    async fn try_get_token(&self, resource: &str) -> Result<Option<String>> {
        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                resource,
                "--output",
                "json",
            ])
            .output()
            .await?;

        if !output.status.success() {
            tracing::debug!(
                status = %output.status,
                "az get-access-token declined; continuing the chain"
            );
            return Ok(None);
        }

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(parsed
            .get("accessToken")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}

/// Point-in-time view of a profile's login state.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub logged_in: bool,
    pub user: Option<String>,
    pub tenant: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

/// Composes cache, store, refresh grant, and the fallback chain.
pub struct TokenBroker {
    identity: IdentityClient,
    store: ProfileStore,
    cache: TokenCache,
    sources: Vec<Box<dyn CredentialSource>>,
}

impl TokenBroker {
    /// Broker with the default fallback chain (Azure CLI).
    pub fn new(identity: IdentityClient, store: ProfileStore) -> Self {
        Self {
            identity,
            store,
            cache: TokenCache::new(),
            sources: vec![Box::new(AzureCliSource)],
        }
    }

    /// Replace the fallback chain (tests, or hosts with extra tooling).
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Box<dyn CredentialSource>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Get a bearer token for `resource` on behalf of `profile`.
    ///
    /// Fails with [`AuthError::NotAuthenticated`] when no path yields a
    /// token; callers translate that into "run login again".
    pub async fn get_access_token(&self, resource: &str, profile: &str) -> Result<String> {
        if let Some(token) = self.cache.get(resource) {
            tracing::debug!(resource, "session cache hit");
            return Ok(token);
        }

        let record = self.store.read(profile);
        // Remember the resolved tenant before any eviction below, so the
        // fallback chain can still enforce it.
        let expected_tenant = record
            .as_ref()
            .map(|r| r.tenant_id.clone())
            .filter(|t| t != COMMON_TENANT);

        if let Some(record) = record.filter(|r| !r.refresh_token.is_empty()) {
            match self.try_refresh(resource, profile, &record).await {
                Ok(token) => return Ok(token),
                Err(err) if err.is_invalid_grant() => {
                    // The refresh token is dead; force a future explicit
                    // login and keep walking the chain.
                    tracing::warn!(profile, "refresh token rejected, clearing profile");
                    self.store.delete(profile)?;
                }
                Err(err) => {
                    tracing::warn!(profile, error = %err, "refresh failed, trying fallbacks");
                }
            }
        }

        for source in &self.sources {
            if !source.available() {
                continue;
            }
            match source.try_get_token(resource).await {
                Ok(Some(token)) => {
                    if let Some(expected) = &expected_tenant {
                        let tid = claims::decode_claims(&token)
                            .as_ref()
                            .and_then(claims::tenant_id);
                        if tid.as_deref().is_some_and(|t| t != expected.as_str()) {
                            tracing::warn!(
                                source = source.name(),
                                expected = %expected,
                                "fallback token is for a different tenant, skipping"
                            );
                            continue;
                        }
                    }
                    tracing::info!(source = source.name(), resource, "using fallback credential");
                    self.cache.put(resource, token.clone());
                    return Ok(token);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(source = source.name(), error = %err, "fallback source failed");
                }
            }
        }

        Err(AuthError::NotAuthenticated.into())
    }

    async fn try_refresh(
        &self,
        resource: &str,
        profile: &str,
        record: &ProfileRecord,
    ) -> Result<String> {
        let scope = resource_scope(resource);
        let tokens = self
            .identity
            .refresh(&record.tenant_id, &record.refresh_token, &scope)
            .await?;

        tracing::debug!(
            resource,
            access_token = %mask_token(&tokens.access_token),
            rotated = tokens.refresh_token.is_some(),
            "refresh grant succeeded"
        );
        self.cache.put(resource, tokens.access_token.clone());

        // Providers rotate refresh tokens; always persist the newest one,
        // serialized against concurrent invocations of this CLI.
        if let Some(new_refresh) = tokens
            .refresh_token
            .as_ref()
            .filter(|rt| **rt != record.refresh_token)
        {
            let _lock = self.store.lock_profile(profile)?;
            let mut current = self.store.read(profile).unwrap_or_else(|| record.clone());
            current.refresh_token = new_refresh.clone();
            current.acquired_at = Utc::now();
            self.store.write(profile, &current)?;
        }

        Ok(tokens.access_token)
    }

    /// Post-login persistence shared by both flow engines: claim
    /// extraction, `common`-tenant adoption, profile write, cache warm.
    pub fn finish_login(
        &self,
        profile: &str,
        requested_tenant: &str,
        resource: &str,
        tokens: &TokenResponse,
    ) -> Result<ProfileRecord> {
        let claims = claims::decode_claims(&tokens.access_token)
            .ok_or(AuthError::MalformedToken)?;

        let tenant_id = match claims::tenant_id(&claims) {
            // A wildcard profile adopts the tenant the token resolved to.
            Some(resolved) if requested_tenant == COMMON_TENANT => resolved,
            _ => requested_tenant.to_string(),
        };
        let record = ProfileRecord {
            tenant_id,
            refresh_token: tokens.refresh_token.clone().unwrap_or_default(),
            user: claims::user_principal(&claims).unwrap_or_default(),
            acquired_at: Utc::now(),
        };

        {
            let _lock = self.store.lock_profile(profile)?;
            self.store.write(profile, &record)?;
        }
        self.cache.put(resource, tokens.access_token.clone());

        tracing::info!(profile, tenant = %record.tenant_id, user = %record.user, "login persisted");
        Ok(record)
    }

    /// True iff the profile holds a refresh token. Liveness probe only.
    pub fn has_valid_session(&self, profile: &str) -> bool {
        self.store.exists(profile)
    }

    pub fn status(&self, profile: &str) -> SessionStatus {
        match self.store.read(profile) {
            Some(record) if !record.refresh_token.is_empty() => SessionStatus {
                logged_in: true,
                user: Some(record.user),
                tenant: Some(record.tenant_id),
                acquired_at: Some(record.acquired_at),
            },
            _ => SessionStatus {
                logged_in: false,
                user: None,
                tenant: None,
                acquired_at: None,
            },
        }
    }

    /// Drop the profile's stored credentials and every cached token.
    pub fn logout(&self, profile: &str) -> Result<()> {
        self.store.delete(profile)?;
        self.cache.clear();
        Ok(())
    }
}
