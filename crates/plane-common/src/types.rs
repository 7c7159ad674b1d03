//! Core identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant identifier as configured (directory GUID or verified domain).
///
/// Isolation is enforced on this configuration identity, not on whatever
/// backend directory it happens to resolve to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_display() {
        let id = TenantId::from("contoso.onmicrosoft.com");
        assert_eq!(id.to_string(), "contoso.onmicrosoft.com");
        assert_eq!(id.as_str(), "contoso.onmicrosoft.com");
    }
}
