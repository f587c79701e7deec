//! Access-control vocabulary shared by the resolution engine and its callers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The operation a principal is asking to perform on an instance.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
  Read,
  Write,
  Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
  Allow,
  Deny,
}

/// Which resolution step produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchedRule {
  TypeDisabled,
  UnknownType,
  InstanceNotFound,
  Administrator,
  /// A role from the role cache matched an expanded access template.
  CachedRole { role: String, pattern: String },
  /// A role fetched directly from the directory matched.
  DirectoryRole { role: String, pattern: String },
  /// The principal is referenced by a staff field on the instance.
  StaffField { field: String },
  NoMatch,
}

/// The outcome of an authorization check. Computed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
  pub effect: Effect,
  #[serde(flatten)]
  pub rule:   MatchedRule,
}

impl AccessDecision {
  pub fn allow(rule: MatchedRule) -> Self { Self { effect: Effect::Allow, rule } }

  pub fn deny(rule: MatchedRule) -> Self { Self { effect: Effect::Deny, rule } }

  pub fn is_allowed(&self) -> bool { self.effect == Effect::Allow }

  /// Allowed by administrator override, as opposed to a role or roster match.
  pub fn is_administrative(&self) -> bool {
    self.is_allowed() && self.rule == MatchedRule::Administrator
  }
}

/// The set of instance slugs a principal may see in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "slugs", rename_all = "snake_case")]
pub enum SlugScope {
  Unrestricted,
  Slugs(BTreeSet<String>),
}

impl SlugScope {
  pub fn none() -> Self { Self::Slugs(BTreeSet::new()) }

  pub fn contains(&self, slug: &str) -> bool {
    match self {
      Self::Unrestricted => true,
      Self::Slugs(set) => set.contains(slug),
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Self::Slugs(set) if set.is_empty())
  }
}
