//! Tenant-Scoped Graph Access
//!
//! Credential acquisition and the throttle-aware API client. Both layers
//! are strictly keyed by tenant id: no token, cache entry, or pacing hint
//! ever crosses a tenant boundary.
//!
//! # Architecture
//!
//! ```text
//! TenantManager ──► CredentialProvider ──► TokenExchanger (authority)
//!        │                 │cache (per tenant)
//!        └───────────► ThrottleAwareClient ──► GraphTransport (upstream)
//!                          │backoff state machine
//!                          │rate-hint cache (per tenant, advisory)
//!                          └──► AuditPipeline (auth/call/retry/throttle)
//! ```

pub mod auth;
pub mod backoff;
pub mod client;
pub mod error;
pub mod throttle;

pub use auth::{Credential, CredentialProvider, HttpTokenExchanger, TokenExchanger};
pub use backoff::{BackoffDecision, RetryPolicy, RetrySchedule};
pub use client::{
    ApiRequest, ApiResponse, CallContext, GraphTransport, HttpMethod, HttpTransport,
    ThrottleAwareClient, TransportReply,
};
pub use error::{AuthError, CallError, TransportError};
pub use throttle::RateHintCache;
