//! Azure AD authentication subsystem.
//!
//! Layered leaves-first:
//!
//! - [`store`] — durable per-profile refresh-token records on disk
//! - [`cache`] — process-scoped, resource-keyed access-token cache
//! - [`claims`] — JWT payload decoding (no verification)
//! - [`pkce`] — verifier/challenge/state material for browser logins
//! - [`browser`] / [`device`] — the two interactive login flow engines
//! - [`endpoints`] — the identity provider's HTTP surface
//! - [`broker`] — the one entry point for "get me a token for resource X"
//!
//! Interactive flows run only from an explicit login; the broker composes
//! cache → refresh → fallback credential sources and never prompts.

pub mod broker;
pub mod browser;
pub mod cache;
pub mod claims;
pub mod device;
pub mod endpoints;
pub mod error;
pub mod pkce;
pub mod store;

pub use broker::{AzureCliSource, CredentialSource, SessionStatus, TokenBroker};
pub use browser::{BrowserLoginFlow, BrowserPrompt};
pub use cache::TokenCache;
pub use device::DeviceCodeFlow;
pub use endpoints::{
    resource_scope, DeviceCodeResponse, IdentityClient, OAuthConfig, TokenResponse,
    COMMON_TENANT, DEFAULT_AUTHORITY, DEFAULT_CLIENT_ID, POWER_PLATFORM_RESOURCE,
};
pub use error::{AuthError, Error, Result};
pub use pkce::PkceExchange;
pub use store::{ProfileRecord, ProfileStore};
