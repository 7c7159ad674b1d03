//! Advisory Rate Pacing
//!
//! Remembers the last throttle signal per tenant so subsequent calls pace
//! themselves below the observed limit. Best-effort only: stale reads cost
//! suboptimal pacing, never correctness, and a hint can never delay a call
//! past the cap.

use dashmap::DashMap;
use plane_common::TenantId;
use std::time::{Duration, Instant};

const DEFAULT_PACE_CAP: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
struct PacingHint {
    pace_until: Instant,
}

/// Per-tenant pacing hints derived from throttle responses.
pub struct RateHintCache {
    hints: DashMap<TenantId, PacingHint>,
    cap: Duration,
}

impl RateHintCache {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_PACE_CAP)
    }

    pub fn with_cap(cap: Duration) -> Self {
        Self {
            hints: DashMap::new(),
            cap,
        }
    }

    /// Record a throttle decision for this tenant.
    pub fn observe_throttle(&self, tenant_id: &TenantId, delay: Duration) {
        self.hints.insert(
            tenant_id.clone(),
            PacingHint {
                pace_until: Instant::now() + delay,
            },
        );
    }

    /// Drop the hint after a successful call.
    pub fn clear(&self, tenant_id: &TenantId) {
        self.hints.remove(tenant_id);
    }

    /// Remaining pre-delay for this tenant, capped. Expired hints are
    /// removed on read.
    pub fn pending_delay(&self, tenant_id: &TenantId) -> Option<Duration> {
        let remaining = {
            let hint = self.hints.get(tenant_id)?;
            hint.pace_until.checked_duration_since(Instant::now())
        };
        match remaining {
            Some(delay) => Some(delay.min(self.cap)),
            None => {
                self.hints.remove(tenant_id);
                None
            }
        }
    }
}

impl Default for RateHintCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_is_tenant_scoped() {
        let cache = RateHintCache::new();
        let a = TenantId::from("a");
        let b = TenantId::from("b");

        cache.observe_throttle(&a, Duration::from_secs(3));
        assert!(cache.pending_delay(&a).is_some());
        assert!(cache.pending_delay(&b).is_none());
    }

    #[test]
    fn test_delay_is_capped() {
        let cache = RateHintCache::with_cap(Duration::from_millis(100));
        let tenant = TenantId::from("a");

        cache.observe_throttle(&tenant, Duration::from_secs(600));
        let delay = cache.pending_delay(&tenant).unwrap();
        assert!(delay <= Duration::from_millis(100));
    }

    #[test]
    fn test_expired_hint_clears() {
        let cache = RateHintCache::new();
        let tenant = TenantId::from("a");

        cache.observe_throttle(&tenant, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.pending_delay(&tenant).is_none());
    }

    #[test]
    fn test_clear_on_success() {
        let cache = RateHintCache::new();
        let tenant = TenantId::from("a");

        cache.observe_throttle(&tenant, Duration::from_secs(30));
        cache.clear(&tenant);
        assert!(cache.pending_delay(&tenant).is_none());
    }
}
