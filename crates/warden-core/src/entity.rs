//! Entity instances and the changesets staged against them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::attribute::{AttributeMap, AttributeValue};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Publication status of an instance.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityStatus {
  Draft,
  Published,
  PendingReview,
  Trashed,
}

impl EntityStatus {
  /// Every status except `Trashed`.
  pub const LIVE: [Self; 3] = [Self::Draft, Self::Published, Self::PendingReview];
}

/// Per-status instance counts shown alongside listings. Instances carrying
/// a pending changeset are additionally counted under `PendingReview`.
pub type StatusCounts = BTreeMap<EntityStatus, usize>;

// ─── Changeset ───────────────────────────────────────────────────────────────

/// Staged, not-yet-applied staff-field updates awaiting administrator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
  pub fields:        AttributeMap,
  pub submitted_by:  String,
  pub submitted_at:  DateTime<Utc>,
  /// The submitter placed themselves into a staff field they did not hold.
  pub self_promoted: bool,
}

impl Changeset {
  /// Fold a later submission into this one. Fields are last-write-wins;
  /// `self_promoted` stays set once any submission set it.
  pub fn merge(&mut self, later: Changeset) {
    self.fields.extend(later.fields);
    self.submitted_by = later.submitted_by;
    self.submitted_at = later.submitted_at;
    self.self_promoted |= later.self_promoted;
  }
}

// ─── Instance ────────────────────────────────────────────────────────────────

/// One managed record of a registered entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInstance {
  pub id:                  Uuid,
  pub type_key:            String,
  pub status:              EntityStatus,
  pub attributes:          AttributeMap,
  pub pending_changeset:   Option<Changeset>,
  /// Set when a staff change was saved as a draft without administrator
  /// sign-off; holds the submitter's id until an administrator clears it.
  #[serde(default)]
  pub review_requested_by: Option<String>,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

impl EntityInstance {
  /// A fresh, empty `Draft` instance.
  pub fn new(type_key: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id:                  Uuid::new_v4(),
      type_key:            type_key.into(),
      status:              EntityStatus::Draft,
      attributes:          AttributeMap::new(),
      pending_changeset:   None,
      review_requested_by: None,
      created_at:          now,
      updated_at:          now,
    }
  }

  pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
    self.attributes.get(key)
  }

  /// `true` when the attribute is present with a non-empty value.
  pub fn has_value(&self, key: &str) -> bool {
    self.attribute(key).is_some_and(|v| !v.is_empty())
  }

  /// The scalar value of the slug attribute, if set.
  pub fn slug<'a>(&'a self, slug_attribute: &str) -> Option<&'a str> {
    match self.attribute(slug_attribute)? {
      AttributeValue::Text(s) if !s.trim().is_empty() => Some(s.as_str()),
      _ => None,
    }
  }

  pub fn has_pending_changeset(&self) -> bool {
    self.pending_changeset.is_some()
  }
}
