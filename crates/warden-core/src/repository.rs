//! The `ContentRepository` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `warden-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  attribute::AttributeKey,
  entity::{EntityInstance, EntityStatus},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// A predicate over one attribute of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeFilter {
  /// The attribute exists with a non-empty value.
  NonEmpty(AttributeKey),
  /// The attribute's scalar form equals `value`.
  Equals { key: AttributeKey, value: String },
  /// The attribute's scalar form is one of `values`.
  OneOf { key: AttributeKey, values: Vec<String> },
  /// The identity attribute references `principal_id` (case-insensitive).
  References { key: AttributeKey, principal_id: String },
}

/// Parameters for [`ContentRepository::query`].
#[derive(Debug, Clone, Default)]
pub struct InstanceQuery {
  pub type_key:              String,
  /// Empty means any status.
  pub statuses:              Vec<EntityStatus>,
  /// Every filter must hold.
  pub all_of:                Vec<AttributeFilter>,
  /// At least one filter must hold (ignored when empty).
  pub any_of:                Vec<AttributeFilter>,
  pub exclude_id:            Option<Uuid>,
  pub has_pending_changeset: Option<bool>,
  pub limit:                 Option<usize>,
}

impl InstanceQuery {
  pub fn for_type(type_key: impl Into<String>) -> Self {
    Self { type_key: type_key.into(), ..Self::default() }
  }

  pub fn statuses(mut self, statuses: impl IntoIterator<Item = EntityStatus>) -> Self {
    self.statuses = statuses.into_iter().collect();
    self
  }

  pub fn all_of(mut self, filter: AttributeFilter) -> Self {
    self.all_of.push(filter);
    self
  }

  pub fn any_of(mut self, filter: AttributeFilter) -> Self {
    self.any_of.push(filter);
    self
  }

  pub fn excluding(mut self, id: Uuid) -> Self {
    self.exclude_id = Some(id);
    self
  }

  pub fn pending(mut self, pending: bool) -> Self {
    self.has_pending_changeset = Some(pending);
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the content repository holding entity instances.
///
/// `put` replaces an instance's attributes, status and pending changeset as
/// one atomic unit; a reader never observes half of a write.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ContentRepository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Retrieve an instance by id. Returns `None` if not found.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<EntityInstance>, Self::Error>> + Send + '_;

  /// Insert or fully replace an instance.
  fn put<'a>(
    &'a self,
    instance: &'a EntityInstance,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Ids of instances matching `query`, oldest first.
  fn query<'a>(
    &'a self,
    query: &'a InstanceQuery,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + 'a;

  /// Update only the status. Returns `false` if the instance does not exist.
  fn set_status(
    &self,
    id: Uuid,
    status: EntityStatus,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
