//! Per-property async locks.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Serialises work on one property while letting different properties
/// proceed in parallel.
#[derive(Default)]
pub struct PropertyLocks {
  inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl PropertyLocks {
  /// Wait for exclusive access to `property_id`. Released on drop.
  pub async fn lock(&self, property_id: Uuid) -> OwnedMutexGuard<()> {
    let slot = {
      let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      // Idle slots are only referenced by the map.
      map.retain(|_, slot| Arc::strong_count(slot) > 1);
      Arc::clone(map.entry(property_id).or_default())
    };
    slot.lock_owned().await
  }
}
