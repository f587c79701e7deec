//! Principals: the authenticated actors behind each request.

use serde::{Deserialize, Serialize};

/// Role tag that marks a principal as administrator-equivalent. Held in the
/// identity provider's tags, never derived from the external directory.
pub const ADMINISTRATOR_TAG: &str = "administrator";

/// Role tag that allows editing restricted fields without full
/// administrator authority.
pub const ELEVATED_TAG: &str = "elevated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub id:        String,
  pub email:     String,
  #[serde(default)]
  pub role_tags: Vec<String>,
}

impl Principal {
  pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
    Self { id: id.into(), email: email.into(), role_tags: Vec::new() }
  }

  pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
    self.role_tags.push(tag.into());
    self
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self.role_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
  }

  pub fn is_administrator(&self) -> bool { self.has_tag(ADMINISTRATOR_TAG) }

  /// May edit restricted fields.
  pub fn is_elevated(&self) -> bool {
    self.is_administrator() || self.has_tag(ELEVATED_TAG)
  }
}
