use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::auth::{
    OAuthConfig, COMMON_TENANT, DEFAULT_AUTHORITY, DEFAULT_CLIENT_ID, POWER_PLATFORM_RESOURCE,
};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Profile used when `--profile` is not given.
    pub default_profile: String,
    /// Identity provider authority base URL.
    pub authority: String,
    /// Public client ID used unless a profile overrides it.
    pub client_id: String,
    /// Default resource tokens are requested for.
    pub resource: String,
    /// Named identity contexts, keyed by profile name.
    pub profiles: HashMap<String, ProfileConfig>,
}

/// Per-profile settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Tenant ID; `"common"` until a login resolves it.
    pub tenant: Option<String>,
    /// Client ID override for this profile.
    pub client_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_profile: "default".to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            resource: POWER_PLATFORM_RESOURCE.to_string(),
            profiles: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `~/.config/ppctl/config.toml`.
    /// Returns `Default` if the file is missing or unparseable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to parse config at {}: {e} — using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "no config file at {} — using defaults",
                    config_path.display()
                );
                Self::default()
            }
        }
    }

    /// Configured tenant for a profile, `"common"` when unset.
    pub fn tenant_for(&self, profile: &str) -> String {
        self.profiles
            .get(profile)
            .and_then(|p| p.tenant.clone())
            .unwrap_or_else(|| COMMON_TENANT.to_string())
    }

    /// Identity provider coordinates for a profile.
    pub fn oauth_config(&self, profile: &str) -> OAuthConfig {
        let client_id = self
            .profiles
            .get(profile)
            .and_then(|p| p.client_id.clone())
            .unwrap_or_else(|| self.client_id.clone());
        OAuthConfig {
            authority: self.authority.clone(),
            client_id,
        }
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("ppctl").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
