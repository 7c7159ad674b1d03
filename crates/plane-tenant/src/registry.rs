//! Tenant Registry
//!
//! The set of known tenants and their configuration handles. Mutations are
//! serialized behind a single writer lock; listing is stable insertion
//! order for reporting.

use crate::model::TenantRecord;
use chrono::Utc;
use parking_lot::RwLock;
use plane_common::TenantId;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tenant not found")]
    NotFound,
    #[error("tenant already registered")]
    Conflict,
}

struct RegistryInner {
    records: HashMap<TenantId, TenantRecord>,
    order: Vec<TenantId>,
}

/// In-memory registry. Durability belongs to a collaborator.
pub struct TenantRegistry {
    inner: RwLock<RegistryInner>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                records: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<TenantRecord> {
        self.inner.read().records.get(tenant_id).cloned()
    }

    /// Insert a record for a previously unknown tenant id.
    ///
    /// This is the atomic gate against concurrent onboarding: if the id
    /// exists in any state the insert conflicts, it never overwrites.
    pub fn insert_new(&self, record: TenantRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.tenant_id) {
            return Err(RegistryError::Conflict);
        }
        inner.order.push(record.tenant_id.clone());
        inner.records.insert(record.tenant_id.clone(), record);
        Ok(())
    }

    /// Mutate an existing record under the write lock. The closure may veto
    /// the transition; `updated_at` is bumped only when it succeeds.
    pub fn update<F>(&self, tenant_id: &TenantId, f: F) -> Result<TenantRecord, RegistryError>
    where
        F: FnOnce(&mut TenantRecord) -> Result<(), RegistryError>,
    {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(tenant_id)
            .ok_or(RegistryError::NotFound)?;
        f(record)?;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Remove a record entirely (failed onboarding cleanup).
    pub fn remove(&self, tenant_id: &TenantId) -> Option<TenantRecord> {
        let mut inner = self.inner.write();
        let removed = inner.records.remove(tenant_id);
        if removed.is_some() {
            inner.order.retain(|id| id != tenant_id);
        }
        removed
    }

    /// All records in insertion order.
    pub fn list(&self) -> Vec<TenantRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}
