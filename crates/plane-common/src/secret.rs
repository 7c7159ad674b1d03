//! Secret References
//!
//! Configuration points at secret material, it never contains it. A
//! `SecretRef` resolves from the environment (or an inline dev-only value)
//! at the moment the credential layer needs it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to secret material held outside the configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecretRef {
    /// Environment variable holding the secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Inline value. Local development only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Key Vault secret URI, resolved out-of-band via managed identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_secret_uri: Option<String>,
}

impl SecretRef {
    /// Reference an environment variable.
    pub fn from_env(name: impl Into<String>) -> Self {
        Self {
            env: Some(name.into()),
            value: None,
            key_vault_secret_uri: None,
        }
    }

    /// Inline value for local development.
    pub fn inline(value: impl Into<String>) -> Self {
        Self {
            env: None,
            value: Some(value.into()),
            key_vault_secret_uri: None,
        }
    }

    /// Resolve the referenced secret. Environment takes precedence over an
    /// inline value; Key Vault URIs must be fetched by the caller before
    /// authentication and resolving one here is an error.
    pub fn resolve(&self) -> Result<String, SecretError> {
        if let Some(env) = &self.env {
            return std::env::var(env).map_err(|_| SecretError::EnvNotSet(env.clone()));
        }
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }
        if self.key_vault_secret_uri.is_some() {
            return Err(SecretError::KeyVaultUnsupported);
        }
        Err(SecretError::Empty)
    }
}

// Never expose the inline value through Debug output.
impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRef")
            .field("env", &self.env)
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .field("key_vault_secret_uri", &self.key_vault_secret_uri)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("environment variable {0} is not set")]
    EnvNotSet(String),
    #[error("key vault resolution must happen before authentication")]
    KeyVaultUnsupported,
    #[error("no secret reference provided")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_inline() {
        let secret = SecretRef::inline("hunter2");
        assert_eq!(secret.resolve().unwrap(), "hunter2");
    }

    #[test]
    fn test_resolve_env() {
        std::env::set_var("PLANE_TEST_SECRET", "from-env");
        let secret = SecretRef::from_env("PLANE_TEST_SECRET");
        assert_eq!(secret.resolve().unwrap(), "from-env");

        let missing = SecretRef::from_env("PLANE_TEST_SECRET_MISSING");
        assert!(matches!(missing.resolve(), Err(SecretError::EnvNotSet(_))));
    }

    #[test]
    fn test_debug_redacts_value() {
        let secret = SecretRef::inline("hunter2");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_key_vault_is_explicitly_unsupported() {
        let secret = SecretRef {
            env: None,
            value: None,
            key_vault_secret_uri: Some("https://kv.example/secrets/app".into()),
        };
        assert!(matches!(
            secret.resolve(),
            Err(SecretError::KeyVaultUnsupported)
        ));
    }
}
