//! Credential Acquisition
//!
//! Resolves short-lived bearer credentials per tenant across the supported
//! trust mechanisms and caches them strictly by tenant id. Tokens never
//! appear in logs or audit details; only a fingerprint does.

use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use plane_audit::{AuditEvent, AuditKind, AuditPipeline};
use plane_common::{AuthSettings, TenantId};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(120);
const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Short-lived bearer credential scoped to exactly one tenant.
#[derive(Clone)]
pub struct Credential {
    pub tenant_id: TenantId,
    token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn new(
        tenant_id: TenantId,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            tenant_id,
            token: token.into(),
            expires_at,
            scopes,
        }
    }

    /// Raw bearer value for the Authorization header.
    pub fn bearer(&self) -> &str {
        &self.token
    }

    /// Redacted sha-256 fingerprint, the only token derivative that may be
    /// audited or logged.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.token.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Fresh enough to use without a new exchange.
    pub fn is_fresh(&self, safety_margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(safety_margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        Utc::now() + margin < self.expires_at
    }

    /// Whether every required capability was granted.
    pub fn grants_all(&self, required: &[String]) -> bool {
        required.iter().all(|r| self.scopes.iter().any(|s| s == r))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("tenant_id", &self.tenant_id)
            .field("token", &format_args!("fp:{}", self.fingerprint()))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Mechanism-specific token exchange against the tenant's authority.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(
        &self,
        tenant_id: &TenantId,
        auth: &AuthSettings,
        scopes: &[String],
    ) -> Result<Credential, AuthError>;
}

/// Production exchanger speaking OAuth2 client credentials and IMDS.
pub struct HttpTokenExchanger {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

impl HttpTokenExchanger {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn client_credentials(
        &self,
        tenant_id: &TenantId,
        authority_host: &str,
        form: &[(&str, String)],
        requested: &[String],
    ) -> Result<Credential, AuthError> {
        let token_url = format!("{authority_host}/{tenant_id}/oauth2/v2.0/token");

        let response = self
            .http
            .post(&token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::NetworkUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TokenErrorResponse>()
                .await
                .map(|e| format!("{}: {}", e.error, e.error_description))
                .unwrap_or_else(|_| format!("status {status}"));
            return Err(AuthError::ExchangeRejected(detail));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeRejected(format!("malformed token reply: {e}")))?;

        Ok(build_credential(tenant_id, body, requested))
    }

    async fn managed_identity(
        &self,
        tenant_id: &TenantId,
        client_id: Option<&str>,
        requested: &[String],
    ) -> Result<Credential, AuthError> {
        // IMDS grants at resource granularity; derive it from the first scope.
        let resource = requested
            .first()
            .map(|s| s.trim_end_matches("/.default").to_string())
            .unwrap_or_else(|| "https://graph.microsoft.com".to_string());

        let mut query = vec![
            ("api-version", "2018-02-01".to_string()),
            ("resource", resource),
        ];
        if let Some(client_id) = client_id {
            query.push(("client_id", client_id.to_string()));
        }

        let response = self
            .http
            .get(IMDS_TOKEN_ENDPOINT)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|e| AuthError::NetworkUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ExchangeRejected(format!(
                "managed identity endpoint returned {}",
                response.status()
            )));
        }

        // IMDS returns expires_in as a string.
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeRejected(format!("malformed token reply: {e}")))?;
        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| AuthError::ExchangeRejected("reply missing access_token".into()))?
            .to_string();
        let expires_in = body["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .or_else(|| body["expires_in"].as_u64())
            .unwrap_or(3600);

        Ok(build_credential(
            tenant_id,
            TokenResponse {
                access_token,
                expires_in,
                scope: None,
            },
            requested,
        ))
    }
}

impl Default for HttpTokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

fn build_credential(
    tenant_id: &TenantId,
    body: TokenResponse,
    requested: &[String],
) -> Credential {
    let scopes = body
        .scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_else(|| requested.to_vec());
    let expires_at = Utc::now() + chrono::Duration::seconds(body.expires_in as i64);
    Credential::new(tenant_id.clone(), body.access_token, expires_at, scopes)
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(
        &self,
        tenant_id: &TenantId,
        auth: &AuthSettings,
        scopes: &[String],
    ) -> Result<Credential, AuthError> {
        match auth {
            AuthSettings::SharedSecret {
                client_id,
                client_secret,
                authority_host,
            } => {
                let secret = client_secret
                    .resolve()
                    .map_err(|e| AuthError::ExpiredReference(e.to_string()))?;
                let form = [
                    ("client_id", client_id.clone()),
                    ("client_secret", secret),
                    ("scope", scopes.join(" ")),
                    ("grant_type", "client_credentials".to_string()),
                ];
                self.client_credentials(tenant_id, authority_host, &form, scopes)
                    .await
            }
            AuthSettings::Certificate {
                client_id,
                certificate_path,
                certificate_password,
                authority_host,
            } => {
                if let Some(password) = certificate_password {
                    password
                        .resolve()
                        .map_err(|e| AuthError::ExpiredReference(e.to_string()))?;
                }
                let certificate = tokio::fs::read(certificate_path).await.map_err(|e| {
                    AuthError::ExpiredReference(format!(
                        "failed to read certificate at {}: {e}",
                        certificate_path.display()
                    ))
                })?;
                // Simplified assertion - production signs a JWT with the
                // certificate key.
                let assertion = hex::encode(Sha256::digest(&certificate));
                let form = [
                    ("client_id", client_id.clone()),
                    (
                        "client_assertion_type",
                        "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
                    ),
                    ("client_assertion", assertion),
                    ("scope", scopes.join(" ")),
                    ("grant_type", "client_credentials".to_string()),
                ];
                self.client_credentials(tenant_id, authority_host, &form, scopes)
                    .await
            }
            AuthSettings::ManagedIdentity { client_id } => {
                self.managed_identity(tenant_id, client_id.as_deref(), scopes)
                    .await
            }
        }
    }
}

/// Per-tenant credential cache in front of a [`TokenExchanger`].
///
/// The cache is keyed strictly by configured tenant id; two tenants never
/// share a cache entry even when they point at the same backend directory.
pub struct CredentialProvider {
    exchanger: Arc<dyn TokenExchanger>,
    cache: DashMap<TenantId, Credential>,
    exchange_locks: DashMap<TenantId, Arc<Mutex<()>>>,
    audit: Arc<AuditPipeline>,
    safety_margin: Duration,
}

impl CredentialProvider {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, audit: Arc<AuditPipeline>) -> Self {
        Self {
            exchanger,
            cache: DashMap::new(),
            exchange_locks: DashMap::new(),
            audit,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Return a fresh credential for the tenant, exchanging only when the
    /// cached one is missing or inside the safety margin.
    ///
    /// Callers must have validated the tenant against the registry; this
    /// layer does no lifecycle checks. Exchange failures are not retried
    /// here beyond the one post-lock cache re-check.
    pub async fn acquire(
        &self,
        tenant_id: &TenantId,
        auth: &AuthSettings,
        scopes: &[String],
        correlation_id: Option<Uuid>,
    ) -> Result<Credential, AuthError> {
        if let Some(cached) = self.cache.get(tenant_id) {
            if cached.is_fresh(self.safety_margin) {
                return Ok(cached.clone());
            }
        }

        let lock = self
            .exchange_locks
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Stale-cache race: a concurrent caller may have refreshed while we
        // waited for the lock.
        if let Some(cached) = self.cache.get(tenant_id) {
            if cached.is_fresh(self.safety_margin) {
                return Ok(cached.clone());
            }
        }

        match self.exchanger.exchange(tenant_id, auth, scopes).await {
            Ok(credential) => {
                if credential.tenant_id != *tenant_id {
                    let err = AuthError::ExchangeRejected(
                        "credential issued for a different tenant".to_string(),
                    );
                    self.audit_exchange(tenant_id, auth, correlation_id, Err(&err));
                    return Err(err);
                }
                self.audit_exchange(tenant_id, auth, correlation_id, Ok(&credential));
                self.cache.insert(tenant_id.clone(), credential.clone());
                Ok(credential)
            }
            Err(err) => {
                self.audit_exchange(tenant_id, auth, correlation_id, Err(&err));
                Err(err)
            }
        }
    }

    /// Drop any cached credential for this tenant. Called on offboarding so
    /// no dispatch started afterwards can reuse a stale token.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        if self.cache.remove(tenant_id).is_some() {
            tracing::debug!(tenant_id = %tenant_id, "credential cache invalidated");
        }
        self.exchange_locks.remove(tenant_id);
    }

    fn audit_exchange(
        &self,
        tenant_id: &TenantId,
        auth: &AuthSettings,
        correlation_id: Option<Uuid>,
        outcome: Result<&Credential, &AuthError>,
    ) {
        let (message, detail) = match outcome {
            Ok(credential) => (
                "token exchange succeeded",
                serde_json::json!({
                    "mechanism": auth.mechanism().to_string(),
                    "fingerprint": credential.fingerprint(),
                    "expires_at": credential.expires_at.to_rfc3339(),
                }),
            ),
            Err(err) => (
                "token exchange failed",
                serde_json::json!({
                    "mechanism": auth.mechanism().to_string(),
                    "kind": err.kind(),
                    "error": err.to_string(),
                }),
            ),
        };

        let mut event =
            AuditEvent::new(AuditKind::Auth, tenant_id.clone(), message).with_detail(detail);
        if let Some(correlation_id) = correlation_id {
            event = event.with_correlation(correlation_id);
        }
        self.audit.record(event);
    }
}
