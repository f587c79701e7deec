//! Entity-type registry.
//!
//! Configurations are collected by a [`RegistryBuilder`] during startup and
//! frozen into an immutable [`Registry`]. A configuration that fails
//! validation is rejected with a [`ConfigError`] and never becomes visible;
//! the rest of the catalog still registers.
//!
//! The only runtime-mutable state is the per-type feature toggle, an
//! `AtomicBool` that defaults to enabled.

use std::{
  collections::{BTreeMap, HashSet},
  sync::atomic::{AtomicBool, Ordering},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  access::Action,
  attribute::AttributeKey,
  field::{FieldDef, FieldKind},
};

/// Slug format applied when a type does not configure its own.
pub const DEFAULT_SLUG_PATTERN: &str = "^[a-z0-9-]{2,32}$";

/// Placeholder substituted with the instance slug in access templates.
pub const SLUG_PLACEHOLDER: &str = "{slug}";

// ─── Configuration records ───────────────────────────────────────────────────

/// Capability names reported for each action, for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityNames {
  #[serde(default)]
  pub read:   String,
  #[serde(default)]
  pub write:  String,
  #[serde(default)]
  pub delete: String,
}

impl CapabilityNames {
  /// `read_<type>`, `edit_<type>`, `delete_<type>`.
  pub fn for_type(type_key: &str) -> Self {
    Self {
      read:   format!("read_{type_key}"),
      write:  format!("edit_{type_key}"),
      delete: format!("delete_{type_key}"),
    }
  }

  pub fn name(&self, action: Action) -> &str {
    match action {
      Action::Read => &self.read,
      Action::Write => &self.write,
      Action::Delete => &self.delete,
    }
  }

  fn is_blank(&self) -> bool {
    self.read.is_empty() && self.write.is_empty() && self.delete.is_empty()
  }
}

/// When `condition_attr` equals `condition_value` (scalar form) after an
/// update, every attribute in `clear_attrs` is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusiveRule {
  pub condition_attr:  AttributeKey,
  pub condition_value: String,
  pub clear_attrs:     Vec<AttributeKey>,
}

/// Everything the engine needs to know about one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeConfig {
  pub type_key:         String,
  pub slug_attribute:   AttributeKey,
  /// Overrides [`DEFAULT_SLUG_PATTERN`].
  #[serde(default)]
  pub slug_pattern:     Option<String>,
  /// Filled from [`CapabilityNames::for_type`] at registration when blank.
  #[serde(default)]
  pub capabilities:     CapabilityNames,
  pub fields:           Vec<FieldDef>,
  pub staff_fields:     Vec<AttributeKey>,
  /// Slash-delimited path templates containing [`SLUG_PLACEHOLDER`].
  pub access_templates: Vec<String>,
  #[serde(default)]
  pub immutable_fields: Vec<AttributeKey>,
  #[serde(default)]
  pub restricted_fields: Vec<AttributeKey>,
  #[serde(default)]
  pub exclusive_rules:  Vec<ExclusiveRule>,
}

impl EntityTypeConfig {
  pub fn field(&self, key: &str) -> Option<&FieldDef> {
    self.fields.iter().find(|f| f.key == key)
  }

  pub fn is_staff_field(&self, key: &str) -> bool {
    self.staff_fields.iter().any(|f| f == key)
  }

  /// The slug attribute is always immutable.
  pub fn is_immutable(&self, key: &str) -> bool {
    key == self.slug_attribute || self.immutable_fields.iter().any(|f| f == key)
  }

  pub fn is_restricted(&self, key: &str) -> bool {
    self.restricted_fields.iter().any(|f| f == key)
  }

  pub fn slug_pattern(&self) -> &str {
    self.slug_pattern.as_deref().unwrap_or(DEFAULT_SLUG_PATTERN)
  }

  pub fn capability(&self, action: Action) -> &str {
    self.capabilities.name(action)
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("entity type has an empty type key")]
  MissingTypeKey,

  #[error("entity type {0:?} has no slug attribute")]
  MissingSlugAttribute(String),

  #[error("entity type {0:?} declares no staff fields")]
  NoStaffFields(String),

  #[error("entity type {0:?} is already registered")]
  DuplicateType(String),

  #[error("entity type {type_key:?} has no access templates")]
  NoAccessTemplates { type_key: String },

  #[error("access template {template:?} of {type_key:?} lacks a {{slug}} placeholder")]
  TemplateWithoutSlug { type_key: String, template: String },

  #[error("slug pattern of {type_key:?} does not compile: {source}")]
  InvalidSlugPattern {
    type_key: String,
    #[source]
    source:   regex::Error,
  },

  #[error("entity type {type_key:?} references undeclared field {field:?}")]
  UnknownField { type_key: String, field: String },

  #[error("staff field {field:?} of {type_key:?} is not an identity field")]
  StaffFieldNotIdentity { type_key: String, field: String },
}

// ─── Builder ─────────────────────────────────────────────────────────────────

struct RegisteredType {
  config:     EntityTypeConfig,
  slug_regex: Regex,
  enabled:    AtomicBool,
}

/// Startup-phase collector. Consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
  types: BTreeMap<String, RegisteredType>,
}

impl RegistryBuilder {
  pub fn new() -> Self { Self::default() }

  /// Validate and add one configuration. On error nothing is registered.
  pub fn register(&mut self, mut config: EntityTypeConfig) -> Result<(), ConfigError> {
    let type_key = config.type_key.trim().to_owned();
    if type_key.is_empty() {
      return Err(ConfigError::MissingTypeKey);
    }
    if config.slug_attribute.trim().is_empty() {
      return Err(ConfigError::MissingSlugAttribute(type_key));
    }
    if config.staff_fields.iter().all(|f| f.trim().is_empty()) {
      return Err(ConfigError::NoStaffFields(type_key));
    }
    if self.types.contains_key(&type_key) {
      return Err(ConfigError::DuplicateType(type_key));
    }
    if config.access_templates.is_empty() {
      return Err(ConfigError::NoAccessTemplates { type_key });
    }
    if let Some(template) = config
      .access_templates
      .iter()
      .find(|t| !t.contains(SLUG_PLACEHOLDER))
    {
      return Err(ConfigError::TemplateWithoutSlug {
        type_key,
        template: template.clone(),
      });
    }

    let declared: HashSet<&str> =
      config.fields.iter().map(|f| f.key.as_str()).collect();
    let referenced = std::iter::once(&config.slug_attribute)
      .chain(&config.staff_fields)
      .chain(&config.immutable_fields)
      .chain(&config.restricted_fields)
      .chain(config.exclusive_rules.iter().flat_map(|r| {
        std::iter::once(&r.condition_attr).chain(&r.clear_attrs)
      }));
    for field in referenced {
      if !declared.contains(field.as_str()) {
        return Err(ConfigError::UnknownField {
          type_key,
          field: field.clone(),
        });
      }
    }
    for staff in &config.staff_fields {
      let is_identity = config
        .field(staff)
        .is_some_and(|f| matches!(f.kind, FieldKind::Identity { .. }));
      if !is_identity {
        return Err(ConfigError::StaffFieldNotIdentity {
          type_key,
          field: staff.clone(),
        });
      }
    }

    let slug_regex = Regex::new(config.slug_pattern()).map_err(|source| {
      ConfigError::InvalidSlugPattern { type_key: type_key.clone(), source }
    })?;

    if config.capabilities.is_blank() {
      config.capabilities = CapabilityNames::for_type(&type_key);
    }
    config.type_key = type_key.clone();

    self.types.insert(type_key, RegisteredType {
      config,
      slug_regex,
      enabled: AtomicBool::new(true),
    });
    Ok(())
  }

  /// Register every configuration, logging and skipping rejected ones.
  /// Returns the errors for callers that want to surface them.
  pub fn register_all(
    &mut self,
    configs: impl IntoIterator<Item = EntityTypeConfig>,
  ) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    for config in configs {
      if let Err(e) = self.register(config) {
        tracing::warn!(error = %e, "entity type rejected");
        errors.push(e);
      }
    }
    errors
  }

  /// Freeze the registry. Types named in `disabled` start toggled off.
  pub fn build<I, S>(self, disabled: I) -> Registry
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let registry = Registry { types: self.types };
    for key in disabled {
      if !registry.set_enabled(key.as_ref(), false) {
        tracing::warn!(type_key = key.as_ref(), "cannot disable unknown entity type");
      }
    }
    registry
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Immutable catalog of entity-type configurations.
pub struct Registry {
  types: BTreeMap<String, RegisteredType>,
}

impl Registry {
  pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

  /// Look up a type regardless of its toggle.
  pub fn lookup(&self, type_key: &str) -> Option<&EntityTypeConfig> {
    self.types.get(type_key).map(|t| &t.config)
  }

  /// Look up a type only if it is enabled. This is what other components
  /// use, so a disabled type is invisible to them.
  pub fn lookup_enabled(&self, type_key: &str) -> Option<&EntityTypeConfig> {
    self
      .types
      .get(type_key)
      .filter(|t| t.enabled.load(Ordering::Acquire))
      .map(|t| &t.config)
  }

  /// Unknown types are reported as disabled.
  pub fn is_enabled(&self, type_key: &str) -> bool {
    self
      .types
      .get(type_key)
      .is_some_and(|t| t.enabled.load(Ordering::Acquire))
  }

  /// Flip a type's feature toggle. Returns `false` for unknown types.
  pub fn set_enabled(&self, type_key: &str, enabled: bool) -> bool {
    match self.types.get(type_key) {
      Some(t) => {
        t.enabled.store(enabled, Ordering::Release);
        true
      }
      None => false,
    }
  }

  pub fn slug_regex(&self, type_key: &str) -> Option<&Regex> {
    self.types.get(type_key).map(|t| &t.slug_regex)
  }

  /// Enabled configurations in type-key order.
  pub fn enabled_types(&self) -> impl Iterator<Item = &EntityTypeConfig> {
    self
      .types
      .values()
      .filter(|t| t.enabled.load(Ordering::Acquire))
      .map(|t| &t.config)
  }
}
