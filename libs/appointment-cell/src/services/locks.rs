// libs/appointment-cell/src/services/locks.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

pub type SlotKey = (Uuid, NaiveDate);

/// Advisory locks keyed by (professional, date).
///
/// Holding the guard serializes the read-check-write of every booking decision
/// on that calendar day. Idle entries are pruned on the next acquire.
#[derive(Default)]
pub struct SlotLockRegistry {
    slots: Mutex<HashMap<SlotKey, Arc<Mutex<()>>>>,
}

pub struct SlotGuard {
    key: SlotKey,
    _guard: OwnedMutexGuard<()>,
}

impl SlotGuard {
    pub fn key(&self) -> SlotKey {
        self.key
    }
}

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, professional_id: Uuid, date: NaiveDate) -> SlotGuard {
        let key = (professional_id, date);
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
            slots.entry(key).or_default().clone()
        };

        debug!("Waiting for calendar lock of professional {} on {}", professional_id, date);
        let guard = slot.lock_owned().await;
        SlotGuard { key, _guard: guard }
    }

    pub async fn tracked_keys(&self) -> usize {
        self.slots.lock().await.len()
    }
}
