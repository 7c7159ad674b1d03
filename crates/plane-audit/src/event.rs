//! Audit Event Model

use chrono::{DateTime, Utc};
use plane_common::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event category.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Auth,
    Call,
    Retry,
    Throttle,
    Onboarding,
    Offboarding,
    Error,
}

/// Immutable record of an action taken or attempted.
///
/// Detail fields are pre-redacted by the emitter; tokens never appear here,
/// only fingerprints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Process-wide emission sequence, assigned by the pipeline.
    pub seq: u64,
    pub kind: AuditKind,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Short description of what happened.
    pub message: String,
    /// Redacted structured fields.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, tenant_id: TenantId, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            seq: 0,
            kind,
            tenant_id,
            correlation_id: None,
            message: message.into(),
            detail: Value::Null,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuditKind::Throttle).unwrap(),
            "\"throttle\""
        );
        assert_eq!(
            serde_json::to_string(&AuditKind::Onboarding).unwrap(),
            "\"onboarding\""
        );
    }

    #[test]
    fn test_event_builder() {
        let correlation = Uuid::new_v4();
        let event = AuditEvent::new(AuditKind::Call, TenantId::from("contoso"), "graph request")
            .with_correlation(correlation)
            .with_detail(serde_json::json!({"status": 200, "attempt": 1}));

        assert_eq!(event.correlation_id, Some(correlation));
        assert_eq!(event.detail["status"], 200);
    }
}
