//! Error type for `warden-engine`.

use thiserror::Error;
use uuid::Uuid;
use warden_core::access::{Action, MatchedRule};

#[derive(Debug, Error)]
pub enum Error {
  /// The keys that failed validation, in field-list order.
  #[error("validation failed for: {}", .0.join(", "))]
  Validation(Vec<String>),

  #[error("{action} denied ({rule:?})")]
  Denied { action: Action, rule: MatchedRule },

  #[error("instance not found: {0}")]
  NotFound(Uuid),

  #[error("unknown entity type: {0}")]
  UnknownType(String),

  #[error("entity type is disabled: {0}")]
  TypeDisabled(String),

  #[error("instance {0} has no pending changeset")]
  NoPendingChangeset(Uuid),

  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Access(#[from] warden_access::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
