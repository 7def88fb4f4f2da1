use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// One async mutex per tenant. Writers of the same tenant queue behind each
/// other; different tenants never contend.
#[derive(Clone, Default)]
pub struct TenantLocks {
    locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant_id: &str) -> OwnedMutexGuard<()> {
        let existing = {
            let locks = self.locks.read().await;
            locks.get(tenant_id).cloned()
        };

        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut locks = self.locks.write().await;
                locks
                    .entry(tenant_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        lock.lock_owned().await
    }
}
