use bnsl_types::PlanId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per plan id. Transitions on the same plan queue behind each
/// other; different plans never contend. Entries disappear once no caller
/// holds or awaits them.
#[derive(Default)]
pub struct PlanLocks {
    registry: Mutex<HashMap<PlanId, Weak<AsyncMutex<()>>>>,
}

impl PlanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, plan_id: PlanId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            registry.retain(|_, weak| weak.strong_count() > 0);
            match registry.get(&plan_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    registry.insert(plan_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of plans with a live lock entry.
    pub fn tracked(&self) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
        registry.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_plan_is_serialised() {
        let locks = Arc::new(PlanLocks::new());
        let id = PlanId([1u8; 32]);

        let guard = locks.lock(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_plans_do_not_contend() {
        let locks = PlanLocks::new();
        let _a = locks.lock(PlanId([1u8; 32])).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(PlanId([2u8; 32]))).await;
        assert!(b.is_ok());
        assert_eq!(locks.tracked(), 2);
    }
}
