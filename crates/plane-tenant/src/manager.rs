//! Tenant Manager
//!
//! Central orchestrator for onboarding, offboarding, and operation
//! dispatch. Composes the credential provider, throttle-aware client, and
//! audit pipeline per tenant and enforces the isolation and lifecycle
//! rules. Provider and client failures never escape raw; they are
//! normalized into the operation result.

use crate::model::{ordered_dedup, TenantRecord, TenantStatus};
use crate::operations::{OperationContext, OperationRegistry};
use crate::registry::{RegistryError, TenantRegistry};
use plane_audit::{AuditEvent, AuditKind, AuditPipeline};
use plane_common::TenantId;
use plane_graph::{
    AuthError, BackoffDecision, CallContext, CredentialProvider, RetryPolicy, ThrottleAwareClient,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Administrative onboarding failure. The tenant is left absent from the
/// registry unless it was already onboarded.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("tenant {tenant_id} is missing required permissions: {missing:?}")]
    MissingPermissions {
        tenant_id: TenantId,
        missing: Vec<String>,
    },
    #[error("permission validation unreachable: {0}")]
    ValidationUnreachable(String),
    #[error("tenant {0} conflicts with an existing registration")]
    Conflict(TenantId),
}

impl OnboardingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingPermissions { .. } => "missing_permissions",
            Self::ValidationUnreachable(_) => "validation_unreachable",
            Self::Conflict(_) => "conflict",
        }
    }
}

/// Dispatch rejected before any upstream work.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("tenant {tenant_id} is not active")]
    TenantNotActive {
        tenant_id: TenantId,
        /// `None` when the tenant was never onboarded.
        status: Option<TenantStatus>,
    },
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Terminal outcome of one dispatched operation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Failed,
    RetriedThenSucceeded,
    RetriedThenFailed,
}

/// Normalized failure attached to an [`OperationResult`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Which layer failed: `auth` or `call`.
    pub layer: String,
    pub kind: String,
    pub message: String,
}

/// Result of one dispatch, success or failure alike.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationResult {
    pub correlation_id: Uuid,
    pub tenant_id: TenantId,
    pub status: OperationStatus,
    pub attempts: u32,
    pub payload: Option<Value>,
    pub error_detail: Option<ErrorDetail>,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Success | OperationStatus::RetriedThenSucceeded
        )
    }
}

/// Orchestrates lifecycle transitions and operation dispatch across all
/// configured tenants.
pub struct TenantManager {
    registry: Arc<TenantRegistry>,
    credentials: Arc<CredentialProvider>,
    client: Arc<ThrottleAwareClient>,
    operations: Arc<OperationRegistry>,
    audit: Arc<AuditPipeline>,
    auth_retry: RetryPolicy,
}

impl TenantManager {
    pub fn new(
        registry: Arc<TenantRegistry>,
        credentials: Arc<CredentialProvider>,
        client: Arc<ThrottleAwareClient>,
        operations: Arc<OperationRegistry>,
        audit: Arc<AuditPipeline>,
    ) -> Self {
        Self {
            registry,
            credentials,
            client,
            operations,
            audit,
            auth_retry: RetryPolicy {
                max_attempts: 3,
                ..RetryPolicy::default()
            },
        }
    }

    /// Backoff policy for credential acquisition retries during dispatch.
    pub fn with_auth_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.auth_retry = policy;
        self
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// Onboard a tenant: reserve the id, validate that the trust mechanism
    /// actually grants the required permission set, then activate.
    ///
    /// Exactly one of N concurrent onboards for the same id can win the
    /// reservation; the rest conflict. A failed validation removes the
    /// reservation so no partial record persists.
    pub async fn onboard(&self, record: TenantRecord) -> Result<TenantRecord, OnboardingError> {
        let mut record = record;
        record.required_permissions = ordered_dedup(record.required_permissions);

        if let Some(existing) = self.registry.get(&record.tenant_id) {
            return self.reonboard(existing, record).await;
        }

        let mut pending = record.clone();
        pending.status = TenantStatus::Pending;
        if self.registry.insert_new(pending).is_err() {
            return Err(OnboardingError::Conflict(record.tenant_id));
        }

        match self.validate_permissions(&record).await {
            Ok(()) => {
                let activated = self
                    .registry
                    .update(&record.tenant_id, |r| {
                        r.status = TenantStatus::Active;
                        Ok(())
                    })
                    .map_err(|_| OnboardingError::Conflict(record.tenant_id.clone()))?;
                self.audit.record(
                    AuditEvent::new(
                        AuditKind::Onboarding,
                        record.tenant_id.clone(),
                        "tenant onboarded",
                    )
                    .with_detail(serde_json::json!({
                        "display_name": record.display_name,
                        "mechanism": record.mechanism().to_string(),
                        "required_permissions": record.required_permissions,
                    })),
                );
                Ok(activated)
            }
            Err(err) => {
                self.registry.remove(&record.tenant_id);
                self.audit.record(
                    AuditEvent::new(AuditKind::Error, record.tenant_id.clone(), "onboarding failed")
                        .with_detail(serde_json::json!({
                            "kind": err.kind(),
                            "error": err.to_string(),
                        })),
                );
                Err(err)
            }
        }
    }

    async fn reonboard(
        &self,
        existing: TenantRecord,
        requested: TenantRecord,
    ) -> Result<TenantRecord, OnboardingError> {
        match existing.status {
            // A pending reservation belongs to a concurrent onboard in
            // flight; offboarded ids are terminal.
            TenantStatus::Pending | TenantStatus::Offboarded => {
                Err(OnboardingError::Conflict(existing.tenant_id))
            }
            TenantStatus::Active | TenantStatus::Suspended => {
                let is_subset = requested
                    .required_permissions
                    .iter()
                    .all(|p| existing.required_permissions.contains(p));
                if is_subset {
                    // Idempotent re-onboard. The required set is never
                    // downgraded.
                    return Ok(existing);
                }

                let mut union = existing.required_permissions.clone();
                for permission in requested.required_permissions {
                    if !union.contains(&permission) {
                        union.push(permission);
                    }
                }

                let mut probe = existing.clone();
                probe.required_permissions = union.clone();
                // A cached credential would report stale grants; force a
                // fresh exchange for the re-validation.
                self.credentials.invalidate(&existing.tenant_id);
                self.validate_permissions(&probe).await?;

                let union_for_update = union.clone();
                let updated = self
                    .registry
                    .update(&existing.tenant_id, |r| {
                        r.required_permissions = union_for_update;
                        Ok(())
                    })
                    .map_err(|_| OnboardingError::Conflict(existing.tenant_id.clone()))?;
                self.audit.record(
                    AuditEvent::new(
                        AuditKind::Onboarding,
                        existing.tenant_id.clone(),
                        "tenant permissions upgraded",
                    )
                    .with_detail(serde_json::json!({ "required_permissions": union })),
                );
                Ok(updated)
            }
        }
    }

    async fn validate_permissions(&self, record: &TenantRecord) -> Result<(), OnboardingError> {
        let credential = self
            .credentials
            .acquire(&record.tenant_id, &record.auth, &record.default_scopes, None)
            .await
            .map_err(|err| OnboardingError::ValidationUnreachable(err.to_string()))?;

        let missing: Vec<String> = record
            .required_permissions
            .iter()
            .filter(|p| !credential.scopes.iter().any(|s| &s == p))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(OnboardingError::MissingPermissions {
                tenant_id: record.tenant_id.clone(),
                missing,
            });
        }
        Ok(())
    }

    /// Transition active/suspended → offboarded, drop any cached credential,
    /// and reject all later dispatches. In-flight dispatches finish on their
    /// own terms. Idempotent for an already-offboarded tenant.
    pub fn offboard(&self, tenant_id: &TenantId) -> Result<(), RegistryError> {
        let mut already_offboarded = false;
        self.registry.update(tenant_id, |r| match r.status {
            TenantStatus::Offboarded => {
                already_offboarded = true;
                Ok(())
            }
            TenantStatus::Pending => Err(RegistryError::Conflict),
            TenantStatus::Active | TenantStatus::Suspended => {
                r.status = TenantStatus::Offboarded;
                Ok(())
            }
        })?;

        if !already_offboarded {
            self.credentials.invalidate(tenant_id);
            self.audit.record(AuditEvent::new(
                AuditKind::Offboarding,
                tenant_id.clone(),
                "tenant offboarded",
            ));
        }
        Ok(())
    }

    /// Active → suspended. New dispatches are rejected until resumed.
    pub fn suspend(&self, tenant_id: &TenantId) -> Result<(), RegistryError> {
        self.registry.update(tenant_id, |r| match r.status {
            TenantStatus::Active => {
                r.status = TenantStatus::Suspended;
                Ok(())
            }
            _ => Err(RegistryError::Conflict),
        })?;
        self.audit.record(AuditEvent::new(
            AuditKind::Onboarding,
            tenant_id.clone(),
            "tenant suspended",
        ));
        Ok(())
    }

    /// Suspended → active.
    pub fn resume(&self, tenant_id: &TenantId) -> Result<(), RegistryError> {
        self.registry.update(tenant_id, |r| match r.status {
            TenantStatus::Suspended => {
                r.status = TenantStatus::Active;
                Ok(())
            }
            _ => Err(RegistryError::Conflict),
        })?;
        self.audit.record(AuditEvent::new(
            AuditKind::Onboarding,
            tenant_id.clone(),
            "tenant resumed",
        ));
        Ok(())
    }

    /// Dispatch a named operation within one tenant's boundary.
    ///
    /// Rejected up front unless the tenant is active and the operation and
    /// its parameters are known. Every other failure is normalized into the
    /// returned [`OperationResult`]; raw transport errors never escape.
    pub async fn dispatch(
        &self,
        tenant_id: &TenantId,
        operation: &str,
        parameters: Map<String, Value>,
        deadline: Option<Instant>,
    ) -> Result<OperationResult, DispatchError> {
        let record = match self.registry.get(tenant_id) {
            Some(record) if record.status == TenantStatus::Active => record,
            other => {
                let status = other.map(|r| r.status);
                tracing::debug!(tenant_id = %tenant_id, ?status, "dispatch rejected");
                self.audit.record(
                    AuditEvent::new(AuditKind::Error, tenant_id.clone(), "dispatch rejected")
                        .with_detail(serde_json::json!({
                            "operation": operation,
                            "status": status,
                        })),
                );
                return Err(DispatchError::TenantNotActive {
                    tenant_id: tenant_id.clone(),
                    status,
                });
            }
        };

        let handler = self
            .operations
            .get(operation)
            .ok_or_else(|| DispatchError::UnknownOperation(operation.to_string()))?;
        handler
            .spec()
            .validate_params(&parameters)
            .map_err(|err| DispatchError::InvalidParameters(err.to_string()))?;

        let correlation_id = Uuid::new_v4();
        let mut ctx = CallContext::new(tenant_id.clone(), correlation_id, record.api_base_url.clone());
        if let Some(deadline) = deadline {
            ctx = ctx.with_deadline(deadline);
        }

        let credential = match self.acquire_with_retry(&record, &ctx).await {
            Ok(credential) => credential,
            Err(err) => {
                self.audit_failure(&ctx, operation, "auth", err.kind(), &err.to_string());
                return Ok(self.failure_result(&ctx, "auth", err.kind(), err.to_string()));
            }
        };

        let outcome = handler
            .run(OperationContext {
                record: &record,
                credential: &credential,
                client: &self.client,
                call: &ctx,
                parameters: &parameters,
            })
            .await;

        match outcome {
            Ok(payload) => {
                let status = if ctx.retries() > 0 {
                    OperationStatus::RetriedThenSucceeded
                } else {
                    OperationStatus::Success
                };
                Ok(OperationResult {
                    correlation_id,
                    tenant_id: tenant_id.clone(),
                    status,
                    attempts: ctx.attempts(),
                    payload: Some(payload),
                    error_detail: None,
                })
            }
            Err(err) => {
                self.audit_failure(&ctx, operation, "call", err.kind(), &err.to_string());
                Ok(self.failure_result(&ctx, "call", err.kind(), err.to_string()))
            }
        }
    }

    /// Credential acquisition with bounded backoff. Only network failures
    /// are retried; a rejected exchange is deterministic and surfaces
    /// immediately.
    async fn acquire_with_retry(
        &self,
        record: &TenantRecord,
        ctx: &CallContext,
    ) -> Result<plane_graph::Credential, AuthError> {
        let mut schedule = self.auth_retry.schedule();
        loop {
            match self
                .credentials
                .acquire(
                    &record.tenant_id,
                    &record.auth,
                    &record.default_scopes,
                    Some(ctx.correlation_id),
                )
                .await
            {
                Ok(credential) => return Ok(credential),
                Err(err) => {
                    if !err.is_retryable() || ctx.deadline_expired() {
                        return Err(err);
                    }
                    match schedule.next_transient() {
                        BackoffDecision::Delay(delay) => {
                            self.audit.record(
                                AuditEvent::new(
                                    AuditKind::Retry,
                                    record.tenant_id.clone(),
                                    "retrying credential acquisition",
                                )
                                .with_correlation(ctx.correlation_id)
                                .with_detail(serde_json::json!({
                                    "attempt": schedule.transient_failures(),
                                    "delay_ms": delay.as_millis() as u64,
                                })),
                            );
                            ctx.note_retry();
                            tokio::time::sleep(delay).await;
                            if ctx.deadline_expired() {
                                return Err(err);
                            }
                        }
                        BackoffDecision::GiveUp => return Err(err),
                    }
                }
            }
        }
    }

    fn failure_result(
        &self,
        ctx: &CallContext,
        layer: &str,
        kind: &str,
        message: String,
    ) -> OperationResult {
        let status = if ctx.retries() > 0 {
            OperationStatus::RetriedThenFailed
        } else {
            OperationStatus::Failed
        };
        OperationResult {
            correlation_id: ctx.correlation_id,
            tenant_id: ctx.tenant_id.clone(),
            status,
            attempts: ctx.attempts(),
            payload: None,
            error_detail: Some(ErrorDetail {
                layer: layer.to_string(),
                kind: kind.to_string(),
                message,
            }),
        }
    }

    fn audit_failure(&self, ctx: &CallContext, operation: &str, layer: &str, kind: &str, error: &str) {
        self.audit.record(
            AuditEvent::new(AuditKind::Error, ctx.tenant_id.clone(), "operation failed")
                .with_correlation(ctx.correlation_id)
                .with_detail(serde_json::json!({
                    "operation": operation,
                    "layer": layer,
                    "kind": kind,
                    "error": error,
                    "attempts": ctx.attempts(),
                })),
        );
    }
}
