//! Trust Mechanism Settings
//!
//! Per-tenant authentication configuration. Carries references into the
//! secret store, never the raw material itself.

use crate::secret::SecretRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default AAD authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// How a tenant proves its identity to the upstream directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSettings {
    /// Confidential client with a shared secret.
    SharedSecret {
        client_id: String,
        client_secret: SecretRef,
        #[serde(default = "default_authority")]
        authority_host: String,
    },
    /// Confidential client with a certificate-signed assertion.
    Certificate {
        client_id: String,
        certificate_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        certificate_password: Option<SecretRef>,
        #[serde(default = "default_authority")]
        authority_host: String,
    },
    /// Platform-managed identity (no secret material at all).
    ManagedIdentity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

impl AuthSettings {
    /// The mechanism this configuration uses.
    pub fn mechanism(&self) -> AuthMechanism {
        match self {
            Self::SharedSecret { .. } => AuthMechanism::SharedSecret,
            Self::Certificate { .. } => AuthMechanism::Certificate,
            Self::ManagedIdentity { .. } => AuthMechanism::ManagedIdentity,
        }
    }
}

/// Trust mechanism discriminant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMechanism {
    Certificate,
    SharedSecret,
    ManagedIdentity,
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Certificate => "certificate",
            Self::SharedSecret => "shared_secret",
            Self::ManagedIdentity => "managed_identity",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_deserialization() {
        let raw = r#"{"type": "shared_secret", "client_id": "app-1", "client_secret": {"env": "APP_SECRET"}}"#;
        let settings: AuthSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.mechanism(), AuthMechanism::SharedSecret);
        match settings {
            AuthSettings::SharedSecret { authority_host, .. } => {
                assert_eq!(authority_host, DEFAULT_AUTHORITY_HOST);
            }
            other => panic!("unexpected settings: {other:?}"),
        }
    }

    #[test]
    fn test_managed_identity_needs_no_reference() {
        let raw = r#"{"type": "managed_identity"}"#;
        let settings: AuthSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.mechanism(), AuthMechanism::ManagedIdentity);
    }
}
