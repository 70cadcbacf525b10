use crate::domain::ids::ShipmentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per shipment, created on first use.
///
/// Held for the whole of a mutating operation, gateway calls included, so two flows for the
/// same shipment never interleave. Different shipments proceed in parallel.
#[derive(Debug, Default, Clone)]
pub struct ShipmentLocks {
    inner: Arc<Mutex<HashMap<ShipmentId, Arc<AsyncMutex<()>>>>>,
}

impl ShipmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: ShipmentId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries nobody else holds a handle to are free to drop.
            map.retain(|key, lock| *key == id || Arc::strong_count(lock) > 1);
            map.entry(id).or_default().clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_shipment_serialised() {
        let locks = ShipmentLocks::new();
        let guard = locks.lock(ShipmentId(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(ShipmentId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // Another shipment is not blocked.
        let _other = locks.lock(ShipmentId(2)).await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }
}
