//! Audit Trail
//!
//! Append-only structured events keyed by tenant and correlation id,
//! fanned out to one or more channels. Recording never fails the operation
//! being audited.

pub mod event;
pub mod sink;
pub mod store;

pub use event::{AuditEvent, AuditKind};
pub use sink::{AuditChannel, AuditPipeline, ChannelError, StoreChannel, TracingChannel};
pub use store::AuditStore;
