//! Field definitions and per-kind sanitization and format rules.
//!
//! Every attribute an entity type accepts is declared by a [`FieldDef`]. The
//! [`FieldKind`] enum is closed: adding a kind means adding its sanitize and
//! format arms here, and the compiler points at every match that needs one.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeKey, AttributeMap, AttributeValue, IdentityRef};

// ─── Kinds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
  Text {
    #[serde(default)]
    max_len: Option<usize>,
  },
  Email,
  Url,
  Number {
    #[serde(default)]
    min: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
  },
  Date,
  Select {
    options: Vec<String>,
  },
  MultiSelect {
    options: Vec<String>,
  },
  Checkbox,
  /// One or more principal references with display metadata.
  Identity {
    #[serde(default)]
    multiple: bool,
  },
  /// Uploaded-file reference; opaque to the core.
  Upload,
  /// Rendered markup; opaque to the core.
  RichText,
}

impl FieldKind {
  pub fn text() -> Self { Self::Text { max_len: None } }

  /// The value stored when the field is entirely absent from a submission.
  ///
  /// Only checkboxes have one: an unchecked box is not posted by a form, so
  /// absence means `false`.
  pub fn absent_default(&self) -> Option<AttributeValue> {
    match self {
      Self::Checkbox => Some(AttributeValue::Flag(false)),
      _ => None,
    }
  }

  /// Normalise a submitted value before it is validated or stored. Values of
  /// an unexpected shape are coerced where the intent is unambiguous and
  /// otherwise passed through for [`FieldKind::accepts`] to reject.
  pub fn sanitize(&self, value: AttributeValue) -> AttributeValue {
    use AttributeValue as V;
    match (self, value) {
      (Self::Text { .. } | Self::Select { .. } | Self::Url, V::Text(s)) => {
        V::Text(strip_control(s.trim()))
      }
      (Self::Text { .. }, V::Number(n)) => V::Text(n.to_string()),
      (Self::Email, V::Text(s)) => V::Text(s.trim().to_lowercase()),
      (Self::Number { .. }, V::Text(s)) => match s.trim().parse::<i64>() {
        Ok(n) => V::Number(n),
        Err(_) => V::Text(s),
      },
      (Self::Date, V::Text(s)) => {
        match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
          Ok(d) => V::Date(d),
          Err(_) => V::Text(s),
        }
      }
      (Self::MultiSelect { .. }, V::List(items)) => V::List(clean_list(items)),
      (Self::MultiSelect { .. }, V::Text(s)) => {
        V::List(clean_list(s.split(',').map(str::to_owned).collect()))
      }
      (Self::Checkbox, V::Text(s)) => V::Flag(matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
      )),
      (Self::Checkbox, V::Number(n)) => V::Flag(n != 0),
      (Self::Identity { multiple }, V::Identity(refs)) => {
        let mut refs = clean_identities(refs);
        if !multiple {
          refs.truncate(1);
        }
        V::Identity(refs)
      }
      (Self::Upload | Self::RichText, V::Text(s)) => V::Opaque(s),
      (_, other) => other,
    }
  }

  /// Whether a non-empty, sanitized value has the right shape and format
  /// for this kind.
  pub fn accepts(&self, value: &AttributeValue) -> bool {
    use AttributeValue as V;
    match (self, value) {
      (Self::Text { max_len }, V::Text(s)) => {
        max_len.is_none_or(|max| s.chars().count() <= max)
      }
      (Self::Email, V::Text(s)) => is_email(s),
      (Self::Url, V::Text(s)) => {
        let rest = s
          .strip_prefix("https://")
          .or_else(|| s.strip_prefix("http://"));
        rest.is_some_and(|r| !r.is_empty() && !r.contains(char::is_whitespace))
      }
      (Self::Number { min, max }, V::Number(n)) => {
        min.is_none_or(|m| *n >= m) && max.is_none_or(|m| *n <= m)
      }
      (Self::Date, V::Date(_)) => true,
      (Self::Select { options }, V::Text(s)) => {
        options.is_empty() || options.iter().any(|o| o == s)
      }
      (Self::MultiSelect { options }, V::List(items)) => {
        options.is_empty() || items.iter().all(|i| options.contains(i))
      }
      (Self::Checkbox, V::Flag(_)) => true,
      (Self::Identity { .. }, V::Identity(refs)) => {
        refs.iter().all(|r| !r.user.contains(char::is_whitespace))
      }
      (Self::Upload | Self::RichText, V::Opaque(_)) => true,
      _ => false,
    }
  }
}

fn strip_control(s: &str) -> String {
  s.chars().filter(|c| !c.is_control()).collect()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
  let mut seen = HashSet::new();
  items
    .into_iter()
    .map(|i| i.trim().to_owned())
    .filter(|i| !i.is_empty() && seen.insert(i.clone()))
    .collect()
}

/// Trim every part, drop blank slots, and drop repeated principals (keeping
/// the first occurrence).
fn clean_identities(refs: Vec<IdentityRef>) -> Vec<IdentityRef> {
  let mut seen = HashSet::new();
  refs
    .into_iter()
    .map(|r| IdentityRef {
      user:         r.user.trim().to_owned(),
      display_name: strip_control(r.display_name.trim()),
      email:        r.email.trim().to_lowercase(),
    })
    .filter(|r| !r.is_blank())
    .filter(|r| r.user.is_empty() || seen.insert(r.user.to_lowercase()))
    .collect()
}

fn is_email(s: &str) -> bool {
  let Some((local, domain)) = s.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain.contains('.')
    && !domain.starts_with('.')
    && !domain.ends_with('.')
    && !s.contains(char::is_whitespace)
}

// ─── Requirement ─────────────────────────────────────────────────────────────

/// When a field must carry a value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Requirement {
  #[default]
  Optional,
  Always,
  /// Required when the submitted value of `attr` equals `value` (scalar
  /// form, so checkboxes compare against `"1"` / `"0"`).
  WhenEquals { attr: AttributeKey, value: String },
}

impl Requirement {
  /// Evaluate against the submission, never against storage.
  pub fn is_required(&self, submitted: &AttributeMap) -> bool {
    match self {
      Self::Optional => false,
      Self::Always => true,
      Self::WhenEquals { attr, value } => submitted
        .get(attr)
        .and_then(AttributeValue::as_scalar)
        .is_some_and(|v| v == value.as_str()),
    }
  }
}

// ─── FieldDef ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
  pub key:      AttributeKey,
  #[serde(flatten)]
  pub kind:     FieldKind,
  #[serde(default)]
  pub required: Requirement,
}

impl FieldDef {
  pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
    Self { key: key.into(), kind, required: Requirement::Optional }
  }

  pub fn required(mut self) -> Self {
    self.required = Requirement::Always;
    self
  }

  pub fn required_when(
    mut self,
    attr: impl Into<String>,
    value: impl Into<String>,
  ) -> Self {
    self.required =
      Requirement::WhenEquals { attr: attr.into(), value: value.into() };
    self
  }
}
