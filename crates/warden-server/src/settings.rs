//! Runtime server configuration, deserialised from `config.toml` layered
//! with `WARDEN_`-prefixed environment variables.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;
use warden_access::{HttpDirectoryConfig, RoleCacheConfig};
use warden_core::{
  catalog,
  principal::Principal,
  registry::{EntityTypeConfig, Registry},
};

#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:           String,
  pub port:           u16,
  pub store_path:     PathBuf,
  /// Without a directory every principal resolves to an empty role set.
  #[serde(default)]
  pub directory:      Option<DirectorySettings>,
  #[serde(default)]
  pub disabled_types: Vec<String>,
  /// Registered after the built-in catalog.
  #[serde(default)]
  pub entity_types:   Vec<EntityTypeConfig>,
  #[serde(default)]
  pub principals:     Vec<PrincipalSettings>,
}

#[derive(Deserialize, Clone)]
pub struct DirectorySettings {
  pub base_url:       String,
  pub client_id:      String,
  #[serde(default)]
  pub api_key:        Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs:   u64,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs: u64,
}

/// A login accepted by the Basic-auth identity provider.
#[derive(Deserialize, Clone)]
pub struct PrincipalSettings {
  pub id:            String,
  pub email:         String,
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  #[serde(default)]
  pub role_tags:     Vec<String>,
}

fn default_timeout_secs() -> u64 { 5 }

fn default_cache_ttl_secs() -> u64 { 600 }

impl ServerConfig {
  /// The built-in catalog plus configured types, with `disabled_types`
  /// toggled off. Rejected types are logged and skipped.
  pub fn build_registry(&self) -> Arc<Registry> {
    let mut builder = Registry::builder();
    builder.register_all(catalog::builtin());
    builder.register_all(self.entity_types.iter().cloned());
    Arc::new(builder.build(&self.disabled_types))
  }

  pub fn role_cache_config(&self) -> RoleCacheConfig {
    match &self.directory {
      Some(d) => RoleCacheConfig {
        ttl:               Duration::from_secs(d.cache_ttl_secs),
        directory_timeout: Duration::from_secs(d.timeout_secs),
        client_id:         d.client_id.clone(),
      },
      None => RoleCacheConfig::default(),
    }
  }

  pub fn directory_config(&self) -> Option<HttpDirectoryConfig> {
    self.directory.as_ref().map(|d| HttpDirectoryConfig {
      base_url: d.base_url.clone(),
      api_key:  d.api_key.clone(),
      timeout:  Duration::from_secs(d.timeout_secs),
    })
  }
}

impl PrincipalSettings {
  pub fn principal(&self) -> Principal {
    Principal {
      id:        self.id.clone(),
      email:     self.email.clone(),
      role_tags: self.role_tags.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TOML: &str = r#"
    host = "127.0.0.1"
    port = 8080
    store_path = ":memory:"
    disabled_types = ["coordinator"]

    [directory]
    base_url = "https://directory.example.org/api"
    client_id = "warden"
    timeout_secs = 2

    [[entity_types]]
    type_key = "venue"
    slug_attribute = "venue_slug"
    staff_fields = ["manager"]
    access_templates = ["venue/{slug}/manager"]
    fields = [
      { key = "venue_slug", kind = "text" },
      { key = "manager", kind = "identity", multiple = false },
    ]

    [[principals]]
    id = "1"
    email = "admin@example.org"
    username = "admin"
    password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"
    role_tags = ["administrator"]
  "#;

  fn parse(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn registry_holds_builtin_and_configured_types() {
    let cfg = parse(TOML);
    let registry = cfg.build_registry();

    assert!(registry.is_enabled("chronicle"));
    assert!(registry.is_enabled("venue"));
    assert!(registry.lookup("coordinator").is_some());
    assert!(!registry.is_enabled("coordinator"));
  }

  #[test]
  fn directory_settings_fill_cache_config() {
    let cfg = parse(TOML);
    let cache = cfg.role_cache_config();
    assert_eq!(cache.client_id, "warden");
    assert_eq!(cache.directory_timeout, Duration::from_secs(2));
    assert_eq!(cache.ttl, Duration::from_secs(600));

    let directory = cfg.directory_config().unwrap();
    assert_eq!(directory.api_key, None);
    assert!(cfg.principals[0].principal().is_administrator());
  }

  #[test]
  fn directory_is_optional() {
    let cfg = parse("host = \"0.0.0.0\"\nport = 1\nstore_path = \"x.db\"\n");
    assert!(cfg.directory_config().is_none());
    assert_eq!(cfg.role_cache_config().client_id, "");
    assert!(cfg.principals.is_empty());
  }
}
