//! Attribute values: the payload stored under each key of an entity
//! instance.
//!
//! Values are a closed set of shapes. Uploaded-file references and rendered
//! markup are carried as [`AttributeValue::Opaque`]; the core never looks
//! inside them.

use std::{
  borrow::Cow,
  collections::{BTreeMap, BTreeSet},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of an attribute on an entity instance (e.g. `"chronicle_slug"`).
pub type AttributeKey = String;

/// Attribute storage for one instance. Ordered so that serialised forms are
/// stable regardless of submission order.
pub type AttributeMap = BTreeMap<AttributeKey, AttributeValue>;

/// Value placed in [`IdentityRef::user`] when the submitter asks for a new
/// principal to be provisioned for the slot.
pub const CREATE_PRINCIPAL_MARKER: &str = "__new__";

// ─── Identity references ─────────────────────────────────────────────────────

/// A principal reference plus the display metadata shown on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityRef {
  /// Principal id, or [`CREATE_PRINCIPAL_MARKER`].
  #[serde(default)]
  pub user:         String,
  #[serde(default)]
  pub display_name: String,
  /// Contact address shown publicly for this slot.
  #[serde(default)]
  pub email:        String,
}

impl IdentityRef {
  pub fn new(
    user: impl Into<String>,
    display_name: impl Into<String>,
    email: impl Into<String>,
  ) -> Self {
    Self {
      user:         user.into(),
      display_name: display_name.into(),
      email:        email.into(),
    }
  }

  /// `true` when every part is empty after trimming.
  pub fn is_blank(&self) -> bool {
    self.user.trim().is_empty()
      && self.display_name.trim().is_empty()
      && self.email.trim().is_empty()
  }

  /// `true` when the principal, display name and contact are all present.
  pub fn is_complete(&self) -> bool {
    !self.user.trim().is_empty()
      && !self.display_name.trim().is_empty()
      && !self.email.trim().is_empty()
  }

  pub fn requests_new_principal(&self) -> bool {
    self.user == CREATE_PRINCIPAL_MARKER
  }

  /// Case-insensitive comparison against a principal id.
  pub fn references(&self, principal_id: &str) -> bool {
    !self.user.is_empty() && self.user.eq_ignore_ascii_case(principal_id)
  }
}

// ─── AttributeValue ──────────────────────────────────────────────────────────

/// The typed payload of an attribute. The variant name serves as the
/// `value_type` discriminant stored by repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AttributeValue {
  Text(String),
  Flag(bool),
  Number(i64),
  Date(NaiveDate),
  List(Vec<String>),
  Identity(Vec<IdentityRef>),
  /// Uploaded-file reference or rendered markup, stored as given.
  Opaque(String),
}

const DISCRIMINANTS: &[&str] =
  &["text", "flag", "number", "date", "list", "identity", "opaque"];

impl AttributeValue {
  pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }

  /// A single-slot identity value.
  pub fn identity(
    user: impl Into<String>,
    display_name: impl Into<String>,
    email: impl Into<String>,
  ) -> Self {
    Self::Identity(vec![IdentityRef::new(user, display_name, email)])
  }

  /// The discriminant string stored in the `value_type` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Text(_) => "text",
      Self::Flag(_) => "flag",
      Self::Number(_) => "number",
      Self::Date(_) => "date",
      Self::List(_) => "list",
      Self::Identity(_) => "identity",
      Self::Opaque(_) => "opaque",
    }
  }

  /// Whether the value counts as "not set" for required and immutability
  /// checks. An unchecked flag is empty; numbers and dates never are.
  pub fn is_empty(&self) -> bool {
    match self {
      Self::Text(s) | Self::Opaque(s) => s.trim().is_empty(),
      Self::Flag(b) => !b,
      Self::Number(_) | Self::Date(_) => false,
      Self::List(items) => items.iter().all(|i| i.trim().is_empty()),
      Self::Identity(refs) => refs.iter().all(IdentityRef::is_blank),
    }
  }

  /// The scalar string form used for condition and equality comparisons.
  /// Flags render as `"1"` / `"0"`. Lists and identities have no scalar
  /// form.
  pub fn as_scalar(&self) -> Option<Cow<'_, str>> {
    match self {
      Self::Text(s) | Self::Opaque(s) => Some(Cow::Borrowed(s.as_str())),
      Self::Flag(true) => Some(Cow::Borrowed("1")),
      Self::Flag(false) => Some(Cow::Borrowed("0")),
      Self::Number(n) => Some(Cow::Owned(n.to_string())),
      Self::Date(d) => Some(Cow::Owned(d.format("%Y-%m-%d").to_string())),
      Self::List(_) | Self::Identity(_) => None,
    }
  }

  pub fn identities(&self) -> &[IdentityRef] {
    match self {
      Self::Identity(refs) => refs,
      _ => &[],
    }
  }

  /// The set of principal ids referenced by an identity value, lowercased.
  /// Empty for every other shape.
  pub fn principal_set(&self) -> BTreeSet<String> {
    self
      .identities()
      .iter()
      .filter(|r| !r.user.trim().is_empty())
      .map(|r| r.user.trim().to_lowercase())
      .collect()
  }

  /// Serialise the inner payload (without the type tag) for storage.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored by a
  /// repository.
  pub fn from_parts(discriminant: &str, data: serde_json::Value) -> Result<Self> {
    if !DISCRIMINANTS.contains(&discriminant) {
      return Err(Error::UnknownValueType(discriminant.to_owned()));
    }
    let wrapped = serde_json::json!({ "type": discriminant, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn principal_set_ignores_order_case_and_blanks() {
    let a = AttributeValue::Identity(vec![
      IdentityRef::new("Alice", "Alice A", "a@example.com"),
      IdentityRef::new("bob", "Bob B", "b@example.com"),
      IdentityRef::new("", "", ""),
    ]);
    let b = AttributeValue::Identity(vec![
      IdentityRef::new("BOB", "Bob", "b@example.com"),
      IdentityRef::new("alice", "Alice", "a@example.com"),
    ]);
    assert_eq!(a.principal_set(), b.principal_set());
  }

  #[test]
  fn emptiness_by_shape() {
    assert!(AttributeValue::text("  ").is_empty());
    assert!(AttributeValue::Flag(false).is_empty());
    assert!(!AttributeValue::Flag(true).is_empty());
    assert!(!AttributeValue::Number(0).is_empty());
    assert!(AttributeValue::Identity(vec![IdentityRef::default()]).is_empty());
    assert!(AttributeValue::List(vec![]).is_empty());
  }

  #[test]
  fn parts_roundtrip_through_storage_form() {
    let value = AttributeValue::identity("42", "Jo", "jo@example.com");
    let data = value.to_json().unwrap();
    let back = AttributeValue::from_parts(value.discriminant(), data).unwrap();
    assert_eq!(back, value);
  }

  #[test]
  fn unknown_discriminant_is_rejected() {
    let err = AttributeValue::from_parts("blob", serde_json::Value::Null)
      .unwrap_err();
    assert!(matches!(err, Error::UnknownValueType(ref d) if d == "blob"));
  }
}
