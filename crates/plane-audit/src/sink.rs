//! Audit Fan-Out Sink
//!
//! Delivers each event to every configured channel. A channel failure never
//! reaches the operation being audited; if every channel fails the event is
//! parked in a fallback buffer so nothing is silently dropped.

use crate::event::AuditEvent;
use crate::store::AuditStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single audit delivery target.
pub trait AuditChannel: Send + Sync {
    fn name(&self) -> &'static str;
    fn emit(&self, event: &AuditEvent) -> Result<(), ChannelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Mirrors every event to structured tracing output.
pub struct TracingChannel;

impl AuditChannel for TracingChannel {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn emit(&self, event: &AuditEvent) -> Result<(), ChannelError> {
        tracing::info!(
            kind = ?event.kind,
            tenant_id = %event.tenant_id,
            correlation_id = ?event.correlation_id,
            seq = event.seq,
            detail = %event.detail,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Appends every event to an in-memory store for UI consumption.
pub struct StoreChannel {
    store: Arc<AuditStore>,
}

impl StoreChannel {
    pub fn new(store: Arc<AuditStore>) -> Self {
        Self { store }
    }
}

impl AuditChannel for StoreChannel {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn emit(&self, event: &AuditEvent) -> Result<(), ChannelError> {
        self.store.append(event.clone());
        Ok(())
    }
}

/// Process-wide audit sink.
///
/// `record` is non-blocking and infallible from the caller's perspective.
/// Delivery is at-least-once across the configured channels when any of
/// them accepts the event.
pub struct AuditPipeline {
    channels: Vec<Arc<dyn AuditChannel>>,
    fallback: AuditStore,
    seq: AtomicU64,
}

impl AuditPipeline {
    pub fn new(channels: Vec<Arc<dyn AuditChannel>>) -> Self {
        Self {
            channels,
            fallback: AuditStore::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Default wiring: tracing mirror plus an in-memory store, returning the
    /// store handle for the pull interface.
    pub fn with_store() -> (Arc<Self>, Arc<AuditStore>) {
        let store = Arc::new(AuditStore::new());
        let pipeline = Self::new(vec![
            Arc::new(TracingChannel),
            Arc::new(StoreChannel::new(store.clone())),
        ]);
        (Arc::new(pipeline), store)
    }

    /// Record an event. Never raises to the caller.
    pub fn record(&self, mut event: AuditEvent) {
        event.seq = self.seq.fetch_add(1, Ordering::Relaxed);

        let mut delivered = false;
        for channel in &self.channels {
            match channel.emit(&event) {
                Ok(()) => delivered = true,
                Err(err) => {
                    tracing::warn!(channel = channel.name(), error = %err, "audit channel failed");
                }
            }
        }

        if !delivered {
            self.fallback.append(event);
        }
    }

    /// Events that could not be delivered to any channel.
    pub fn undelivered(&self) -> Vec<AuditEvent> {
        self.fallback.dump(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditKind;
    use plane_common::TenantId;

    struct FailingChannel;

    impl AuditChannel for FailingChannel {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn emit(&self, _event: &AuditEvent) -> Result<(), ChannelError> {
            Err(ChannelError::Unavailable("sink offline".into()))
        }
    }

    fn event(message: &str) -> AuditEvent {
        AuditEvent::new(AuditKind::Auth, TenantId::from("contoso"), message)
    }

    #[test]
    fn test_failing_channel_degrades_to_remaining() {
        let store = Arc::new(AuditStore::new());
        let pipeline = AuditPipeline::new(vec![
            Arc::new(FailingChannel),
            Arc::new(StoreChannel::new(store.clone())),
        ]);

        pipeline.record(event("still delivered"));

        assert_eq!(store.len(), 1);
        assert!(pipeline.undelivered().is_empty());
    }

    #[test]
    fn test_all_channels_failing_falls_back() {
        let pipeline = AuditPipeline::new(vec![Arc::new(FailingChannel)]);
        pipeline.record(event("parked"));

        let parked = pipeline.undelivered();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].message, "parked");
    }

    #[test]
    fn test_sequence_numbers_preserve_emission_order() {
        let store = Arc::new(AuditStore::new());
        let pipeline = AuditPipeline::new(vec![Arc::new(StoreChannel::new(store.clone()))]);

        for i in 0..5 {
            pipeline.record(event(&format!("event {i}")));
        }

        let dumped = store.dump(None, None, None);
        let seqs: Vec<u64> = dumped.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }
}
