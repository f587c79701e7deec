//! Per-principal role cache in front of the external directory.
//!
//! A miss calls the directory once, bounded by a timeout. Any failure
//! stores an **empty** role set with the normal TTL, so an unreachable
//! directory denies role-based access instead of being retried on every
//! request. Concurrent misses for the same principal may each fetch; the
//! last write wins.
//!
//! The cache also holds per-(principal, type) status counts, which depend on
//! the principal's roles and are dropped with them. Expired entries of
//! either kind are swept whenever a new one is stored.

use std::{
  sync::atomic::{AtomicU64, Ordering},
  time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};
use warden_core::{
  directory::{DirectoryError, RoleDirectory},
  entity::StatusCounts,
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoleCacheConfig {
  /// How long a resolved role set (including an empty one) is trusted.
  pub ttl:               Duration,
  /// Upper bound on a single directory call.
  pub directory_timeout: Duration,
  /// Identifies this deployment to the directory.
  pub client_id:         String,
}

impl Default for RoleCacheConfig {
  fn default() -> Self {
    Self {
      ttl:               Duration::from_secs(600),
      directory_timeout: Duration::from_secs(5),
      client_id:         String::new(),
    }
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoleCacheEntry {
  pub principal_id: String,
  pub email:        String,
  pub roles:        Vec<String>,
  pub expires_at:   Instant,
}

impl RoleCacheEntry {
  pub fn is_expired(&self) -> bool { Instant::now() >= self.expires_at }
}

struct CountsEntry {
  counts:     StatusCounts,
  expires_at: Instant,
}

impl CountsEntry {
  fn is_expired(&self) -> bool { Instant::now() >= self.expires_at }
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CacheStats {
  pub hits:               AtomicU64,
  pub misses:             AtomicU64,
  pub directory_failures: AtomicU64,
}

impl CacheStats {
  pub fn snapshot(&self) -> CacheStatsSnapshot {
    CacheStatsSnapshot {
      hits:               self.hits.load(Ordering::Relaxed),
      misses:             self.misses.load(Ordering::Relaxed),
      directory_failures: self.directory_failures.load(Ordering::Relaxed),
      ..CacheStatsSnapshot::default()
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct CacheStatsSnapshot {
  pub hits:               u64,
  pub misses:             u64,
  pub directory_failures: u64,
  /// Role sets currently held, live or awaiting the next sweep.
  pub role_entries:       usize,
  pub count_entries:      usize,
}

// ─── Cache ───────────────────────────────────────────────────────────────────

pub struct RoleCache<D> {
  directory: Option<D>,
  config:    RoleCacheConfig,
  roles:     DashMap<String, RoleCacheEntry>,
  counts:    DashMap<(String, String), CountsEntry>,
  stats:     CacheStats,
}

impl<D: RoleDirectory> RoleCache<D> {
  /// `directory` is `None` when no directory is configured; every miss then
  /// resolves to an empty role set.
  pub fn new(directory: Option<D>, config: RoleCacheConfig) -> Self {
    Self {
      directory,
      config,
      roles: DashMap::new(),
      counts: DashMap::new(),
      stats: CacheStats::default(),
    }
  }

  pub fn has_live_directory(&self) -> bool { self.directory.is_some() }

  pub fn config(&self) -> &RoleCacheConfig { &self.config }

  pub fn stats(&self) -> CacheStatsSnapshot {
    CacheStatsSnapshot {
      role_entries: self.roles.len(),
      count_entries: self.counts.len(),
      ..self.stats.snapshot()
    }
  }

  /// The current entry for `principal_id`, expired or not.
  pub fn entry(&self, principal_id: &str) -> Option<RoleCacheEntry> {
    self.roles.get(principal_id).map(|e| e.value().clone())
  }

  /// Roles held by the principal: from the cache within TTL, otherwise from
  /// the directory. Never fails.
  pub async fn roles_for(&self, principal_id: &str, email: &str) -> Vec<String> {
    // Clone out so no map guard is held across the await below.
    let cached = self
      .roles
      .get(principal_id)
      .filter(|e| !e.is_expired())
      .map(|e| e.roles.clone());
    if let Some(roles) = cached {
      self.stats.hits.fetch_add(1, Ordering::Relaxed);
      debug!(principal_id, roles = roles.len(), "role cache hit");
      return roles;
    }

    self.stats.misses.fetch_add(1, Ordering::Relaxed);
    debug!(principal_id, "role cache miss");

    let roles = self.fetch(principal_id, email).await.unwrap_or_default();
    self.store(principal_id, email, roles.clone());
    roles
  }

  /// Bypass the cache and ask the directory directly. A non-empty answer
  /// replaces the cached entry; an empty one or a failure leaves it alone.
  pub async fn fetch_direct(&self, principal_id: &str, email: &str) -> Vec<String> {
    let roles = self.fetch(principal_id, email).await.unwrap_or_default();
    if !roles.is_empty() {
      self.store(principal_id, email, roles.clone());
    }
    roles
  }

  /// Drop the principal's roles and every count computed from them.
  pub fn invalidate(&self, principal_id: &str) {
    self.roles.remove(principal_id);
    self.counts.retain(|(p, _), _| p != principal_id);
    debug!(principal_id, "role cache invalidated");
  }

  pub fn cached_counts(&self, principal_id: &str, type_key: &str) -> Option<StatusCounts> {
    let key = (principal_id.to_owned(), type_key.to_owned());
    self
      .counts
      .get(&key)
      .filter(|e| !e.is_expired())
      .map(|e| e.counts.clone())
  }

  pub fn store_counts(&self, principal_id: &str, type_key: &str, counts: StatusCounts) {
    self.counts.retain(|_, e| !e.is_expired());
    self.counts.insert((principal_id.to_owned(), type_key.to_owned()), CountsEntry {
      counts,
      expires_at: Instant::now() + self.config.ttl,
    });
  }

  /// Drop counts for `type_key` across every principal.
  pub fn invalidate_counts(&self, type_key: &str) {
    self.counts.retain(|(_, t), _| t != type_key);
  }

  fn store(&self, principal_id: &str, email: &str, roles: Vec<String>) {
    self.roles.retain(|_, e| !e.is_expired());
    self.roles.insert(principal_id.to_owned(), RoleCacheEntry {
      principal_id: principal_id.to_owned(),
      email: email.to_owned(),
      roles,
      expires_at: Instant::now() + self.config.ttl,
    });
  }

  async fn fetch(&self, principal_id: &str, email: &str) -> Result<Vec<String>, DirectoryError> {
    let Some(directory) = &self.directory else {
      return Ok(Vec::new());
    };

    let call = directory.roles_by_email(email, &self.config.client_id);
    let result = match tokio::time::timeout(self.config.directory_timeout, call).await {
      Ok(result) => result,
      Err(_) => Err(DirectoryError::Timeout(self.config.directory_timeout)),
    };

    if let Err(e) = &result {
      self.stats.directory_failures.fetch_add(1, Ordering::Relaxed);
      warn!(principal_id, error = %e, "directory lookup failed; treating as no roles");
    }
    result
  }
}
