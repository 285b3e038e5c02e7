//! Per-organization job serialization

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

use crate::error::{PlanningError, PlanningResult};

/// Held while a job runs for one organization
pub type OrganizationGuard = OwnedMutexGuard<()>;

/// One try-lock per organization; a second job fails fast
#[derive(Clone, Default)]
pub struct OrganizationLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrganizationLocks {
    /// Lock table with no organization held
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the organization lock or fail with `ConcurrentReplan`
    pub fn try_lock(&self, organization_id: Uuid) -> PlanningResult<OrganizationGuard> {
        let lock = self
            .locks
            .entry(organization_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.try_lock_owned().map_err(|_| {
            warn!(organization_id = %organization_id, "Organization job already running");
            PlanningError::ConcurrentReplan { organization_id }
        })
    }
}
