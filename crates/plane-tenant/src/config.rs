//! Configuration Loading
//!
//! Collaborator-facing surface: a YAML document listing tenants, their
//! trust mechanism references, and the permissions to validate during
//! onboarding. Secrets are referenced, never inlined by the loader.

use crate::model::{ordered_dedup, TenantRecord, TenantStatus, DEFAULT_API_BASE_URL, DEFAULT_SCOPE};
use chrono::Utc;
use plane_common::AuthSettings;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file unreadable: {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_yaml::Error),
    #[error("tenant {0} must configure at least one scope")]
    NoScopes(String),
}

/// One tenant as declared in configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantEntry {
    pub tenant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub auth: AuthSettings,
    #[serde(default = "default_scopes")]
    pub default_scopes: Vec<String>,
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl TenantEntry {
    /// Build the pending record onboarding starts from.
    pub fn into_record(self) -> TenantRecord {
        let now = Utc::now();
        TenantRecord {
            tenant_id: self.tenant_id.into(),
            display_name: self.display_name,
            auth: self.auth,
            api_base_url: self.api_base_url,
            default_scopes: self.default_scopes,
            required_permissions: ordered_dedup(self.required_permissions),
            status: TenantStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Startup configuration for the whole control plane.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPlaneConfig {
    pub tenants: Vec<TenantEntry>,
}

impl ControlPlaneConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        for tenant in &config.tenants {
            if tenant.default_scopes.is_empty() {
                return Err(ConfigError::NoScopes(tenant.tenant_id.clone()));
            }
        }
        Ok(config)
    }
}
