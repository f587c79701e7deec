//! Staff-change governance.
//!
//! A write that changes who sits in a staff field is only applied directly
//! when the actor holds administrator authority and is not placing
//! themselves. Otherwise a published instance keeps its live roster and the
//! staff changes are staged in a [`Changeset`]; an unpublished one is saved
//! as a draft and held there, through later edits, until an administrator
//! publishes or approves it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use warden_core::{
  attribute::{AttributeMap, AttributeValue},
  entity::{Changeset, EntityInstance, EntityStatus},
  registry::EntityTypeConfig,
};

use crate::pipeline::{Merged, apply_exclusive_rules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GovernanceState {
  /// Written as submitted.
  Clean,
  /// Everything written, status forced to `Draft`.
  GatedDraft,
  /// Non-staff fields written, staff fields staged for approval.
  GatedPending,
  /// A pending changeset was approved or rejected.
  Resolved,
}

/// What the submitter is told about a gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
  PendingApproval,
  SavedAsDraft,
}

impl Notice {
  pub fn message(self) -> &'static str {
    match self {
      Self::PendingApproval => "Staff changes submitted, pending approval.",
      Self::SavedAsDraft => {
        "Staff changes require administrator approval; the entry was saved as a draft."
      }
    }
  }
}

/// Choose the governance state for a write.
///
/// `administrative` is true only when the actor's authority came from the
/// administrator override, not from a role path or a staff-field match.
/// `review_held` is true when the instance carries a drafted staff change
/// that this actor may not sign off.
pub fn decide(
  prior_status: EntityStatus,
  staff_dirty: bool,
  administrative: bool,
  self_promoted: bool,
  review_held: bool,
) -> GovernanceState {
  let gated = staff_dirty && !(administrative && !self_promoted);
  if !gated && !review_held {
    GovernanceState::Clean
  } else if prior_status == EntityStatus::Published && !review_held {
    GovernanceState::GatedPending
  } else {
    GovernanceState::GatedDraft
  }
}

/// Produce the instance to store for a write in `state`.
pub fn settle(
  mut instance: EntityInstance,
  merged: Merged,
  state: GovernanceState,
  requested: Option<EntityStatus>,
  actor_id: &str,
  now: DateTime<Utc>,
) -> (EntityInstance, Option<Notice>) {
  // A trashed instance stays in the trash unless another status is asked for.
  let trashing = match requested {
    Some(status) => status == EntityStatus::Trashed,
    None => instance.status == EntityStatus::Trashed,
  };
  let notice = match state {
    GovernanceState::Clean | GovernanceState::Resolved => {
      instance.attributes = merged.attributes;
      instance.status = match requested {
        Some(status) => status,
        None if trashing => EntityStatus::Trashed,
        None => EntityStatus::Published,
      };
      instance.review_requested_by = None;
      None
    }
    GovernanceState::GatedDraft => {
      instance.attributes = merged.attributes;
      instance.status = if trashing { EntityStatus::Trashed } else { EntityStatus::Draft };
      instance.review_requested_by.get_or_insert_with(|| actor_id.to_owned());
      Some(Notice::SavedAsDraft)
    }
    GovernanceState::GatedPending => {
      let mut live = merged.attributes;
      let mut staged = AttributeMap::new();
      for key in &merged.dirty_fields {
        let proposed = live
          .remove(key)
          .unwrap_or_else(|| AttributeValue::Identity(Vec::new()));
        staged.insert(key.clone(), proposed);
        if let Some(prior) = instance.attributes.get(key) {
          live.insert(key.clone(), prior.clone());
        }
      }

      let submission = Changeset {
        fields:        staged,
        submitted_by:  actor_id.to_owned(),
        submitted_at:  now,
        self_promoted: merged.self_promoted,
      };
      instance.pending_changeset = Some(match instance.pending_changeset.take() {
        Some(mut pending) => {
          pending.merge(submission);
          pending
        }
        None => submission,
      });
      instance.attributes = live;
      instance.status = if trashing { EntityStatus::Trashed } else { EntityStatus::Published };
      Some(Notice::PendingApproval)
    }
  };
  instance.updated_at = now;
  (instance, notice)
}

/// Apply the pending changeset over the live attributes, lift any draft
/// hold and publish. Returns `None` when nothing awaits review.
pub fn approve(
  config: &EntityTypeConfig,
  mut instance: EntityInstance,
  now: DateTime<Utc>,
) -> Option<EntityInstance> {
  let held = instance.review_requested_by.take();
  match instance.pending_changeset.take() {
    Some(changeset) => instance.attributes.extend(changeset.fields),
    None if held.is_some() => {}
    None => return None,
  }
  apply_exclusive_rules(config, &mut instance.attributes);
  if instance.status != EntityStatus::Trashed {
    instance.status = EntityStatus::Published;
  }
  instance.updated_at = now;
  Some(instance)
}

/// Discard the pending changeset, leaving live attributes untouched.
/// Returns `None` when nothing is pending.
pub fn reject(mut instance: EntityInstance, now: DateTime<Utc>) -> Option<EntityInstance> {
  instance.pending_changeset.take()?;
  instance.updated_at = now;
  Some(instance)
}
