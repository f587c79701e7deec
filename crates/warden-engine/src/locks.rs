//! Keyed async locks that serialize read-modify-write cycles against the
//! repository.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
  held: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds one key. The map entry is dropped with the last holder.
pub struct KeyGuard<'a> {
  locks: &'a KeyedLocks,
  key:   String,
  guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
  /// Wait for exclusive use of `key`.
  pub async fn lock(&self, key: String) -> KeyGuard<'_> {
    let mutex = Arc::clone(&self.held.entry(key.clone()).or_default());
    let guard = mutex.lock_owned().await;
    KeyGuard { locks: self, key, guard: Some(guard) }
  }

  #[cfg(test)]
  fn len(&self) -> usize { self.held.len() }
}

impl Drop for KeyGuard<'_> {
  fn drop(&mut self) {
    self.guard.take();
    // Only the map's own reference left: nobody holds or waits on the key.
    self
      .locks
      .held
      .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
  }
}

pub fn instance_key(id: uuid::Uuid) -> String { format!("instance/{id}") }

pub fn slug_key(type_key: &str, slug: &str) -> String { format!("slug/{type_key}/{slug}") }

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn second_holder_waits_for_the_first() {
    let locks = KeyedLocks::default();
    let first = locks.lock("k".into()).await;

    let waiting = tokio::time::timeout(Duration::from_millis(20), locks.lock("k".into())).await;
    assert!(waiting.is_err());

    let other = tokio::time::timeout(Duration::from_millis(20), locks.lock("j".into())).await;
    assert!(other.is_ok());
    drop(other);

    drop(first);
    let _second = locks.lock("k".into()).await;
    assert_eq!(locks.len(), 1);
  }

  #[tokio::test]
  async fn entries_are_dropped_with_the_last_guard() {
    let locks = KeyedLocks::default();
    {
      let _a = locks.lock(instance_key(uuid::Uuid::new_v4())).await;
      let _b = locks.lock(slug_key("chronicle", "abc")).await;
      assert_eq!(locks.len(), 2);
    }
    assert_eq!(locks.len(), 0);
  }
}
