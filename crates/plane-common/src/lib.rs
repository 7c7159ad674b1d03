//! Shared types for the OpenPlane control plane.
//!
//! Leaf crate holding the identifiers, secret references, and trust
//! mechanism settings every other plane crate builds on.

pub mod auth;
pub mod secret;
pub mod types;

pub use auth::{AuthMechanism, AuthSettings, DEFAULT_AUTHORITY_HOST};
pub use secret::{SecretError, SecretRef};
pub use types::TenantId;
