//! Throttle-Aware Graph Client
//!
//! Wraps every upstream call with a per-attempt timeout, throttle and
//! transient retry handling, advisory pacing, and per-attempt audit events.
//! Stateless across tenants except for the per-tenant rate-hint cache.

use crate::auth::Credential;
use crate::backoff::{BackoffDecision, RetryPolicy};
use crate::error::{CallError, TransportError};
use crate::throttle::RateHintCache;
use async_trait::async_trait;
use plane_audit::{AuditEvent, AuditKind, AuditPipeline};
use plane_common::TenantId;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request methods the control plane issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// One upstream request, relative to the tenant's API base URL.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// Successful upstream response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Raw reply surfaced by a transport before classification.
#[derive(Clone, Debug)]
pub struct TransportReply {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Value,
}

/// Seam between the retry engine and the wire.
#[async_trait]
pub trait GraphTransport: Send + Sync {
    async fn send(
        &self,
        base_url: &str,
        bearer: &str,
        request: &ApiRequest,
    ) -> Result<TransportReply, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphTransport for HttpTransport {
    async fn send(
        &self,
        base_url: &str,
        bearer: &str,
        request: &ApiRequest,
    ) -> Result<TransportReply, TransportError> {
        let url = format!("{}{}", base_url, request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Patch => self.http.patch(&url),
            HttpMethod::Delete => self.http.delete(&url),
        };
        builder = builder.bearer_auth(bearer);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.json().await.unwrap_or(Value::Null);

        Ok(TransportReply {
            status,
            retry_after,
            body,
        })
    }
}

/// Tenant- and correlation-scoped state for one dispatch.
///
/// Accumulates attempt counters across every call a handler makes so the
/// manager can report them on the operation result.
pub struct CallContext {
    pub tenant_id: TenantId,
    pub correlation_id: Uuid,
    pub base_url: String,
    pub deadline: Option<Instant>,
    attempts: AtomicU32,
    retries: AtomicU32,
}

impl CallContext {
    pub fn new(tenant_id: TenantId, correlation_id: Uuid, base_url: impl Into<String>) -> Self {
        Self {
            tenant_id,
            correlation_id,
            base_url: base_url.into(),
            deadline: None,
            attempts: AtomicU32::new(0),
            retries: AtomicU32::new(0),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Upstream attempts made so far under this correlation id.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Backoff decisions taken so far under this correlation id.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Record a retry decision made outside the client (auth retries).
    pub fn note_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deadline_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    fn note_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn would_outlive_deadline(&self, delay: Duration) -> bool {
        self.deadline
            .map_or(false, |d| Instant::now() + delay >= d)
    }
}

enum Attempt {
    Reply(TransportReply),
    Network(String),
    TimedOut,
}

enum Classified {
    Success(TransportReply),
    Throttled { status: u16, hint: Option<Duration> },
    Transient(String),
    NonRetryable { status: u16, detail: String },
}

// Throttling takes precedence over a hard status in the same reply: a 503
// carrying Retry-After is paced and retried, not surfaced.
fn classify(attempt: Attempt) -> Classified {
    match attempt {
        Attempt::Reply(reply) if reply.status < 400 => Classified::Success(reply),
        Attempt::Reply(reply) if reply.retry_after.is_some() || reply.status == 429 => {
            Classified::Throttled {
                status: reply.status,
                hint: reply.retry_after,
            }
        }
        Attempt::Reply(reply) if reply.status >= 500 => {
            Classified::Transient(format!("upstream returned {}", reply.status))
        }
        Attempt::Reply(reply) => Classified::NonRetryable {
            status: reply.status,
            detail: reply.body.to_string(),
        },
        Attempt::Network(detail) => Classified::Transient(detail),
        Attempt::TimedOut => Classified::Transient("attempt timed out".to_string()),
    }
}

/// Upstream client enforcing timeout, retry, and throttling policy.
pub struct ThrottleAwareClient {
    transport: Arc<dyn GraphTransport>,
    audit: Arc<AuditPipeline>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    pacing: RateHintCache,
}

impl ThrottleAwareClient {
    pub fn new(transport: Arc<dyn GraphTransport>, audit: Arc<AuditPipeline>) -> Self {
        Self {
            transport,
            audit,
            policy: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            pacing: RateHintCache::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Advisory pacing state, exposed for inspection.
    pub fn pacing(&self) -> &RateHintCache {
        &self.pacing
    }

    /// Execute one request under the retry policy.
    ///
    /// Once the context deadline passes no new attempt or backoff starts;
    /// an attempt already on the wire finishes on its own terms.
    pub async fn call(
        &self,
        credential: &Credential,
        request: ApiRequest,
        ctx: &CallContext,
    ) -> Result<ApiResponse, CallError> {
        if credential.tenant_id != ctx.tenant_id {
            return Err(CallError::NonRetryable {
                status: 0,
                detail: "credential does not belong to this tenant".to_string(),
            });
        }

        let mut schedule = self.policy.schedule();
        let mut attempts = 0u32;
        let mut last_error = String::from("no attempt made");

        // Pace below the last observed limit for this tenant. Advisory: the
        // delay is capped and skipped entirely near the deadline.
        if let Some(delay) = self.pacing.pending_delay(&ctx.tenant_id) {
            if !ctx.would_outlive_deadline(delay) {
                tracing::debug!(
                    tenant_id = %ctx.tenant_id,
                    delay_ms = delay.as_millis() as u64,
                    "pacing below last observed rate limit"
                );
                tokio::time::sleep(delay).await;
            }
        }

        loop {
            if ctx.deadline_expired() {
                return Err(CallError::Timeout { attempts });
            }

            attempts += 1;
            ctx.note_attempt();

            let attempt = match tokio::time::timeout(
                self.attempt_timeout,
                self.transport
                    .send(&ctx.base_url, credential.bearer(), &request),
            )
            .await
            {
                Ok(Ok(reply)) => Attempt::Reply(reply),
                Ok(Err(err)) => Attempt::Network(err.to_string()),
                Err(_) => Attempt::TimedOut,
            };

            self.audit_attempt(ctx, &request, attempts, &attempt);

            match classify(attempt) {
                Classified::Success(reply) => {
                    self.pacing.clear(&ctx.tenant_id);
                    return Ok(ApiResponse {
                        status: reply.status,
                        body: reply.body,
                    });
                }
                Classified::Throttled { status, hint } => {
                    last_error = format!("throttled (status {status})");
                    match schedule.next_throttle(hint) {
                        BackoffDecision::Delay(delay) => {
                            self.pacing.observe_throttle(&ctx.tenant_id, delay);
                            self.audit_backoff(ctx, AuditKind::Throttle, attempts, delay, hint);
                            ctx.note_retry();
                            if ctx.would_outlive_deadline(delay) {
                                return Err(CallError::Timeout { attempts });
                            }
                            tokio::time::sleep(delay).await;
                        }
                        BackoffDecision::GiveUp => {
                            return Err(CallError::ExhaustedRetries {
                                attempts,
                                last: last_error,
                            });
                        }
                    }
                }
                Classified::Transient(detail) => {
                    last_error = detail;
                    match schedule.next_transient() {
                        BackoffDecision::Delay(delay) => {
                            self.audit_backoff(ctx, AuditKind::Retry, attempts, delay, None);
                            ctx.note_retry();
                            if ctx.would_outlive_deadline(delay) {
                                return Err(CallError::Timeout { attempts });
                            }
                            tokio::time::sleep(delay).await;
                        }
                        BackoffDecision::GiveUp => {
                            return Err(CallError::ExhaustedRetries {
                                attempts,
                                last: last_error,
                            });
                        }
                    }
                }
                Classified::NonRetryable { status, detail } => {
                    return Err(CallError::NonRetryable { status, detail });
                }
            }
        }
    }

    fn audit_attempt(&self, ctx: &CallContext, request: &ApiRequest, attempt: u32, outcome: &Attempt) {
        let outcome_detail = match outcome {
            Attempt::Reply(reply) => serde_json::json!({ "status": reply.status }),
            Attempt::Network(detail) => serde_json::json!({ "network_error": detail }),
            Attempt::TimedOut => serde_json::json!({ "timed_out": true }),
        };
        let detail = serde_json::json!({
            "attempt": attempt,
            "method": request.method.as_str(),
            "path": request.path,
            "outcome": outcome_detail,
        });
        self.audit.record(
            AuditEvent::new(AuditKind::Call, ctx.tenant_id.clone(), "upstream call attempt")
                .with_correlation(ctx.correlation_id)
                .with_detail(detail),
        );
    }

    fn audit_backoff(
        &self,
        ctx: &CallContext,
        kind: AuditKind,
        attempt: u32,
        delay: Duration,
        hint: Option<Duration>,
    ) {
        let detail = serde_json::json!({
            "attempt": attempt,
            "delay_ms": delay.as_millis() as u64,
            "hinted": hint.is_some(),
        });
        self.audit.record(
            AuditEvent::new(kind, ctx.tenant_id.clone(), "backing off before retry")
                .with_correlation(ctx.correlation_id)
                .with_detail(detail),
        );
    }
}
