//! Tenant Data Model

use chrono::{DateTime, Utc};
use plane_common::{AuthMechanism, AuthSettings, TenantId};
use serde::{Deserialize, Serialize};

/// Graph endpoint used unless a national-cloud override is configured.
pub const DEFAULT_API_BASE_URL: &str = "https://graph.microsoft.com";

/// Scope requested by default for app-only flows.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Lifecycle state of a tenant.
///
/// `unknown` is the absence of a record; `Offboarded` is terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Pending,
    Active,
    Suspended,
    Offboarded,
}

/// Configuration handle for one tenant. Carries secret references, never
/// secret values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_id: TenantId,
    pub display_name: Option<String>,
    pub auth: AuthSettings,
    pub api_base_url: String,
    pub default_scopes: Vec<String>,
    /// Capabilities the service must hold in this tenant, in declaration
    /// order, duplicate-free.
    pub required_permissions: Vec<String>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    pub fn new(tenant_id: impl Into<TenantId>, auth: AuthSettings) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            display_name: None,
            auth,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            default_scopes: vec![DEFAULT_SCOPE.to_string()],
            required_permissions: Vec::new(),
            status: TenantStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    pub fn with_required_permissions(mut self, permissions: Vec<String>) -> Self {
        self.required_permissions = ordered_dedup(permissions);
        self
    }

    pub fn mechanism(&self) -> AuthMechanism {
        self.auth.mechanism()
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// Deduplicate while keeping first-seen order.
pub(crate) fn ordered_dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plane_common::SecretRef;

    fn auth() -> AuthSettings {
        AuthSettings::SharedSecret {
            client_id: "app-1".into(),
            client_secret: SecretRef::from_env("APP_SECRET"),
            authority_host: plane_common::DEFAULT_AUTHORITY_HOST.into(),
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = TenantRecord::new("contoso", auth());
        assert_eq!(record.status, TenantStatus::Pending);
        assert_eq!(record.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(record.default_scopes, vec![DEFAULT_SCOPE.to_string()]);
    }

    #[test]
    fn test_required_permissions_dedup_keeps_order() {
        let record = TenantRecord::new("contoso", auth()).with_required_permissions(vec![
            "group.readwrite.all".into(),
            "user.read.all".into(),
            "group.readwrite.all".into(),
        ]);
        assert_eq!(
            record.required_permissions,
            vec!["group.readwrite.all".to_string(), "user.read.all".to_string()]
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TenantStatus::Offboarded).unwrap(),
            "\"offboarded\""
        );
    }
}
