//! The field save/validate pipeline.
//!
//! Everything here is synchronous and storage-free. The one check that needs
//! the repository, slug uniqueness, is computed by the caller and passed in.
//!
//! Order of operations for a write:
//!
//! 1. [`prepare`] drops unknown keys, sanitizes each value per field kind and
//!    fills absent checkboxes with `false`.
//! 2. [`effective`] drops immutable fields that already hold a value and, for
//!    non-elevated actors, restricted fields.
//! 3. [`check`] returns the keys that fail validation.
//! 4. [`merge`] overlays the submission on the stored attributes, runs the
//!    exclusive-field rules and reports which staff fields changed.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::debug;
use warden_core::{
  attribute::{AttributeKey, AttributeMap, AttributeValue},
  entity::EntityInstance,
  field::FieldKind,
  registry::EntityTypeConfig,
};

/// Sanitize a raw submission. Keys not in the field list are dropped.
pub fn prepare(config: &EntityTypeConfig, submitted: AttributeMap) -> AttributeMap {
  let mut prepared = AttributeMap::new();
  for (key, value) in submitted {
    match config.field(&key) {
      Some(field) => {
        prepared.insert(key, field.kind.sanitize(value));
      }
      None => debug!(type_key = %config.type_key, key, "ignoring undeclared attribute"),
    }
  }

  // An unchecked box is simply not submitted. Restricted checkboxes are
  // exempt so that absence is never read as clearing them.
  for field in &config.fields {
    if config.is_restricted(&field.key) || prepared.contains_key(&field.key) {
      continue;
    }
    if let Some(default) = field.kind.absent_default() {
      prepared.insert(field.key.clone(), default);
    }
  }
  prepared
}

/// The part of a prepared submission that will actually be written.
pub fn effective(
  config: &EntityTypeConfig,
  prepared: AttributeMap,
  existing: Option<&EntityInstance>,
  elevated: bool,
) -> AttributeMap {
  prepared
    .into_iter()
    .filter(|(key, _)| {
      if config.is_immutable(key) && existing.is_some_and(|e| e.has_value(key)) {
        debug!(type_key = %config.type_key, key, "ignoring immutable field");
        return false;
      }
      if config.is_restricted(key) && !elevated {
        debug!(type_key = %config.type_key, key, "ignoring restricted field");
        return false;
      }
      true
    })
    .collect()
}

/// Keys of `submitted` that fail validation, in field-list order.
///
/// `slug_taken` reports whether another live instance of the type already
/// uses the submitted slug.
pub fn check(
  config: &EntityTypeConfig,
  slug_regex: &Regex,
  submitted: &AttributeMap,
  existing: Option<&EntityInstance>,
  slug_taken: bool,
) -> Vec<AttributeKey> {
  let mut failing = Vec::new();

  for field in &config.fields {
    let key = &field.key;
    let value = submitted.get(key).filter(|v| !v.is_empty());
    let required = field.required.is_required(submitted);

    let Some(value) = value else {
      // Only an absent key falls back to storage; a submitted blank clears.
      let stored = !submitted.contains_key(key) && existing.is_some_and(|e| e.has_value(key));
      if required && !stored {
        failing.push(key.clone());
      }
      continue;
    };

    let mut ok = field.kind.accepts(value);

    if ok && required && matches!(field.kind, FieldKind::Identity { .. }) {
      ok = value.identities().iter().all(|r| r.is_complete());
    }

    if ok && *key == config.slug_attribute {
      let slug = value.as_scalar().unwrap_or_default();
      ok = slug_regex.is_match(&slug) && !slug_taken;
    }

    if !ok {
      failing.push(key.clone());
    }
  }
  failing
}

// ─── Merge ───────────────────────────────────────────────────────────────────

/// The result of overlaying a submission on an instance's attributes.
#[derive(Debug, Clone)]
pub struct Merged {
  pub attributes:    AttributeMap,
  /// Staff fields whose principal set changed, or that ask for a new
  /// principal.
  pub dirty_fields:  Vec<AttributeKey>,
  /// The actor newly appears in at least one staff field.
  pub self_promoted: bool,
}

impl Merged {
  pub fn staff_fields_dirty(&self) -> bool { !self.dirty_fields.is_empty() }
}

/// Overlay `submitted` (already passed through [`effective`]) on
/// `current`, then apply the exclusive-field rules.
pub fn merge(
  config: &EntityTypeConfig,
  current: &AttributeMap,
  submitted: AttributeMap,
  actor_id: &str,
) -> Merged {
  let mut attributes = current.clone();
  attributes.extend(submitted);
  apply_exclusive_rules(config, &mut attributes);

  let actor = actor_id.trim().to_lowercase();
  let mut dirty_fields = Vec::new();
  let mut self_promoted = false;

  for key in &config.staff_fields {
    let before = principal_set(current, key);
    let after = principal_set(&attributes, key);
    let wants_new = attributes
      .get(key)
      .is_some_and(|v| v.identities().iter().any(|r| r.requests_new_principal()));

    if before != after || wants_new {
      dirty_fields.push(key.clone());
    }
    if after.contains(&actor) && !before.contains(&actor) {
      self_promoted = true;
    }
  }

  Merged { attributes, dirty_fields, self_promoted }
}

/// Clear the attributes named by every rule whose condition holds.
pub fn apply_exclusive_rules(config: &EntityTypeConfig, attributes: &mut AttributeMap) {
  for rule in &config.exclusive_rules {
    let holds = attributes
      .get(&rule.condition_attr)
      .and_then(AttributeValue::as_scalar)
      .is_some_and(|v| v == rule.condition_value.as_str());
    if holds {
      for key in &rule.clear_attrs {
        if attributes.remove(key).is_some() {
          debug!(type_key = %config.type_key, key, "cleared by exclusive rule");
        }
      }
    }
  }
}

fn principal_set(attributes: &AttributeMap, key: &str) -> BTreeSet<String> {
  attributes
    .get(key)
    .map(AttributeValue::principal_set)
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use warden_core::{attribute::IdentityRef, catalog};

  use super::*;

  fn chronicle() -> (EntityTypeConfig, Regex) {
    let config = catalog::chronicle();
    let regex = Regex::new(config.slug_pattern()).unwrap();
    (config, regex)
  }

  fn submission(pairs: &[(&str, AttributeValue)]) -> AttributeMap {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  fn hst(user: &str) -> AttributeValue {
    AttributeValue::identity(user, "Head Storyteller", "hst@example.com")
  }

  #[test]
  fn prepare_drops_unknown_keys_and_defaults_checkboxes() {
    let (mut config, _) = chronicle();
    config.restricted_fields.retain(|f| f != "chronicle_probationary");

    let prepared = prepare(
      &config,
      submission(&[
        ("title", AttributeValue::text("  Night City ")),
        ("favourite_colour", AttributeValue::text("teal")),
      ]),
    );

    assert_eq!(prepared["title"], AttributeValue::text("Night City"));
    assert!(!prepared.contains_key("favourite_colour"));
    assert_eq!(prepared["chronicle_probationary"], AttributeValue::Flag(false));
    // Restricted checkboxes are left alone.
    assert!(!prepared.contains_key("chronicle_satellite"));
  }

  #[test]
  fn effective_skips_immutable_once_set_and_restricted_for_members() {
    let (config, _) = chronicle();
    let mut existing = EntityInstance::new("chronicle");
    existing
      .attributes
      .insert("chronicle_slug".into(), AttributeValue::text("abc"));

    let prepared = submission(&[
      ("chronicle_slug", AttributeValue::text("xyz")),
      ("chronicle_satellite", AttributeValue::Flag(true)),
      ("title", AttributeValue::text("t")),
    ]);

    let member = effective(&config, prepared.clone(), Some(&existing), false);
    assert_eq!(member.keys().collect::<Vec<_>>(), vec!["title"]);

    let elevated = effective(&config, prepared, Some(&existing), true);
    assert!(elevated.contains_key("chronicle_satellite"));
    assert!(!elevated.contains_key("chronicle_slug"));
  }

  #[test]
  fn required_fields_fall_back_to_stored_values() {
    let (config, regex) = chronicle();
    let failing = check(&config, &regex, &AttributeMap::new(), None, false);
    assert_eq!(failing, vec!["chronicle_slug", "title", "hst_info"]);

    let mut existing = EntityInstance::new("chronicle");
    existing
      .attributes
      .insert("chronicle_slug".into(), AttributeValue::text("abc"));
    existing
      .attributes
      .insert("title".into(), AttributeValue::text("Night City"));
    existing.attributes.insert("hst_info".into(), hst("7"));
    let failing = check(&config, &regex, &AttributeMap::new(), Some(&existing), false);
    assert!(failing.is_empty());

    let cleared = submission(&[("title", AttributeValue::text(""))]);
    let failing = check(&config, &regex, &cleared, Some(&existing), false);
    assert_eq!(failing, vec!["title"]);
  }

  #[test]
  fn conditional_requirement_reads_the_submission() {
    let (config, regex) = chronicle();
    let base = [
      ("chronicle_slug", AttributeValue::text("abc")),
      ("title", AttributeValue::text("t")),
      ("hst_info", hst("7")),
    ];

    let mut satellite = submission(&base);
    satellite.insert("chronicle_satellite".into(), AttributeValue::Flag(true));
    assert_eq!(check(&config, &regex, &satellite, None, false), vec!["chronicle_parent"]);

    let mut standalone = submission(&base);
    standalone.insert("chronicle_satellite".into(), AttributeValue::Flag(false));
    assert!(check(&config, &regex, &standalone, None, false).is_empty());
  }

  #[test]
  fn slug_format_and_uniqueness() {
    let (config, regex) = chronicle();
    let mut sub = submission(&[
      ("chronicle_slug", AttributeValue::text("Not A Slug")),
      ("title", AttributeValue::text("t")),
      ("hst_info", hst("7")),
    ]);
    assert_eq!(check(&config, &regex, &sub, None, false), vec!["chronicle_slug"]);

    sub.insert("chronicle_slug".into(), AttributeValue::text("abc"));
    assert!(check(&config, &regex, &sub, None, false).is_empty());
    assert_eq!(check(&config, &regex, &sub, None, true), vec!["chronicle_slug"]);
  }

  #[test]
  fn required_identity_must_be_complete() {
    let (config, regex) = chronicle();
    let sub = submission(&[
      ("chronicle_slug", AttributeValue::text("abc")),
      ("title", AttributeValue::text("t")),
      ("hst_info", AttributeValue::Identity(vec![IdentityRef::new("7", "", "")])),
      // Optional identity fields may be partial.
      ("cm_info", AttributeValue::Identity(vec![IdentityRef::new("8", "", "")])),
    ]);
    assert_eq!(check(&config, &regex, &sub, None, false), vec!["hst_info"]);
  }

  #[test]
  fn kind_formats_are_checked() {
    let (config, regex) = chronicle();
    let sub = prepare(
      &config,
      submission(&[
        ("chronicle_slug", AttributeValue::text("abc")),
        ("title", AttributeValue::text("t")),
        ("hst_info", hst("7")),
        ("web_url", AttributeValue::text("not a url")),
        ("active_since", AttributeValue::text("yesterday")),
        ("game_type", AttributeValue::text("boardgame")),
      ]),
    );
    assert_eq!(check(&config, &regex, &sub, None, false), vec![
      "game_type",
      "active_since",
      "web_url"
    ]);
  }

  #[test]
  fn staff_dirtiness_ignores_order_and_case() {
    let (config, _) = chronicle();
    let current = submission(&[(
      "ast_list",
      AttributeValue::Identity(vec![
        IdentityRef::new("alice", "Alice", "a@example.com"),
        IdentityRef::new("bob", "Bob", "b@example.com"),
      ]),
    )]);
    let reordered = submission(&[(
      "ast_list",
      AttributeValue::Identity(vec![
        IdentityRef::new("BOB", "Bob", "b@example.com"),
        IdentityRef::new("Alice", "Alice A.", "a@example.com"),
      ]),
    )]);

    let merged = merge(&config, &current, reordered, "carol");
    assert!(!merged.staff_fields_dirty());
    assert!(!merged.self_promoted);
  }

  #[test]
  fn self_promotion_and_new_principal_marker_are_dirty() {
    let (config, _) = chronicle();
    let current = submission(&[("hst_info", hst("7"))]);

    let merged = merge(&config, &current, submission(&[("cm_info", hst("8"))]), "8");
    assert_eq!(merged.dirty_fields, vec!["cm_info"]);
    assert!(merged.self_promoted);

    let marker = submission(&[("ast_list", AttributeValue::Identity(vec![IdentityRef::new(
      warden_core::attribute::CREATE_PRINCIPAL_MARKER,
      "New Storyteller",
      "new@example.com",
    )]))]);
    let merged = merge(&config, &current, marker, "7");
    assert_eq!(merged.dirty_fields, vec!["ast_list"]);
    assert!(!merged.self_promoted);
  }

  #[test]
  fn exclusive_rules_clear_after_update() {
    let (config, _) = chronicle();
    let current = submission(&[
      ("cm_info", hst("8")),
      ("chronicle_parent", AttributeValue::text("main")),
    ]);

    let satellite = merge(
      &config,
      &current,
      submission(&[("chronicle_satellite", AttributeValue::Flag(true))]),
      "1",
    );
    assert!(!satellite.attributes.contains_key("cm_info"));
    assert!(satellite.attributes.contains_key("chronicle_parent"));
    assert_eq!(satellite.dirty_fields, vec!["cm_info"]);

    let standalone = merge(
      &config,
      &current,
      submission(&[("chronicle_satellite", AttributeValue::Flag(false))]),
      "1",
    );
    assert!(standalone.attributes.contains_key("cm_info"));
    assert!(!standalone.attributes.contains_key("chronicle_parent"));
  }
}
