//! Error types for the credential and call layers

use thiserror::Error;

/// Credential acquisition failure.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The configured secret reference could not be resolved any more.
    #[error("auth reference expired or unresolvable: {0}")]
    ExpiredReference(String),
    /// The authority refused the exchange (bad client, revoked consent).
    #[error("token exchange rejected: {0}")]
    ExchangeRejected(String),
    /// The authority could not be reached.
    #[error("identity endpoint unreachable: {0}")]
    NetworkUnavailable(String),
}

impl AuthError {
    /// Stable kind tag used in audit details and normalized results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExpiredReference(_) => "expired_reference",
            Self::ExchangeRejected(_) => "exchange_rejected",
            Self::NetworkUnavailable(_) => "network_unavailable",
        }
    }

    /// Whether the manager may retry the exchange with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }
}

/// Upstream call failure after the retry policy has run its course.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("retries exhausted after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: String },
    #[error("non-retryable upstream error (status {status}): {detail}")]
    NonRetryable { status: u16, detail: String },
    #[error("deadline exceeded after {attempts} attempts")]
    Timeout { attempts: u32 },
}

impl CallError {
    /// Stable kind tag used in audit details and normalized results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExhaustedRetries { .. } => "exhausted_retries",
            Self::NonRetryable { .. } => "non_retryable",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Upstream attempts made before this call failed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::ExhaustedRetries { attempts, .. } | Self::Timeout { attempts } => *attempts,
            Self::NonRetryable { .. } => 1,
        }
    }
}

/// Raw transport failure, classified by the client before it escapes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
}
