//! In-Memory Audit Store
//!
//! Bounded buffer backing the pull interface used by front ends. Durability
//! is a collaborator's concern; this store exists for reporting and tests.

use crate::event::AuditEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plane_common::TenantId;
use std::collections::VecDeque;

const DEFAULT_CAPACITY: usize = 1000;

/// Thread-safe bounded event buffer.
pub struct AuditStore {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl AuditStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, dropping the oldest once at capacity.
    pub fn append(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent events, newest first, optionally scoped to one tenant.
    pub fn recent(&self, tenant_id: Option<&TenantId>, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.lock();
        events
            .iter()
            .rev()
            .filter(|e| tenant_id.map_or(true, |t| &e.tenant_id == t))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Full dump in emission order, optionally scoped by tenant and time range.
    pub fn dump(
        &self,
        tenant_id: Option<&TenantId>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AuditEvent> {
        let events = self.events.lock();
        events
            .iter()
            .filter(|e| tenant_id.map_or(true, |t| &e.tenant_id == t))
            .filter(|e| from.map_or(true, |f| e.timestamp >= f))
            .filter(|e| to.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditKind;

    fn event(tenant: &str, message: &str) -> AuditEvent {
        AuditEvent::new(AuditKind::Call, TenantId::from(tenant), message)
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let store = AuditStore::with_capacity(2);
        store.append(event("a", "first"));
        store.append(event("a", "second"));
        store.append(event("a", "third"));

        let all = store.dump(None, None, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "second");
        assert_eq!(all[1].message, "third");
    }

    #[test]
    fn test_recent_is_newest_first_and_tenant_scoped() {
        let store = AuditStore::new();
        store.append(event("a", "a1"));
        store.append(event("b", "b1"));
        store.append(event("a", "a2"));

        let tenant_a = TenantId::from("a");
        let recent = store.recent(Some(&tenant_a), 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "a2");
        assert_eq!(recent[1].message, "a1");

        assert_eq!(store.recent(None, 1).len(), 1);
    }

    #[test]
    fn test_dump_time_range() {
        let store = AuditStore::new();
        let mut early = event("a", "early");
        early.timestamp = Utc::now() - chrono::Duration::hours(2);
        store.append(early);
        store.append(event("a", "late"));

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let windowed = store.dump(None, Some(cutoff), None);
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].message, "late");
    }
}
