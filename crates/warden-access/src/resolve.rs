//! The permission resolution engine.
//!
//! [`Authorizer::authorize`] short-circuits in a fixed order: disabled type,
//! administrator tag, cached roles against the expanded access templates,
//! a direct directory call when the cached set was empty, staff-field
//! membership, and finally deny.

use std::{collections::BTreeSet, sync::Arc};

use tracing::debug;
use uuid::Uuid;
use warden_core::{
  access::{AccessDecision, Action, MatchedRule, SlugScope},
  directory::RoleDirectory,
  entity::{EntityInstance, EntityStatus},
  principal::Principal,
  registry::{EntityTypeConfig, Registry},
  repository::{AttributeFilter, ContentRepository, InstanceQuery},
};

use crate::{
  Error, Result,
  cache::RoleCache,
  pattern::{PathPattern, SlugCapture, expand_template},
};

/// Upper bound on the staff-field scan behind [`Authorizer::accessible_slugs`].
pub const STAFF_SCAN_LIMIT: usize = 100;

pub struct Authorizer<R, D> {
  registry: Arc<Registry>,
  repo:     R,
  cache:    RoleCache<D>,
}

impl<R, D> Authorizer<R, D>
where
  R: ContentRepository,
  D: RoleDirectory,
{
  pub fn new(registry: Arc<Registry>, repo: R, cache: RoleCache<D>) -> Self {
    Self { registry, repo, cache }
  }

  pub fn registry(&self) -> &Registry { &self.registry }

  pub fn repository(&self) -> &R { &self.repo }

  pub fn cache(&self) -> &RoleCache<D> { &self.cache }

  /// Decide whether `principal` may perform `action` on a stored instance.
  pub async fn authorize(
    &self,
    principal: &Principal,
    type_key: &str,
    instance_id: Uuid,
    action: Action,
  ) -> Result<AccessDecision> {
    let Some(config) = self.registry.lookup(type_key) else {
      return Ok(AccessDecision::deny(MatchedRule::UnknownType));
    };
    if !self.registry.is_enabled(type_key) {
      return Ok(log_decision(principal, config, action, AccessDecision::deny(
        MatchedRule::TypeDisabled,
      )));
    }
    if principal.is_administrator() {
      return Ok(log_decision(principal, config, action, AccessDecision::allow(
        MatchedRule::Administrator,
      )));
    }

    let instance = self
      .repo
      .get(instance_id)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;
    let decision = match instance {
      Some(instance) if instance.type_key == type_key => {
        self.authorize_instance(principal, &instance, action).await
      }
      _ => AccessDecision::deny(MatchedRule::InstanceNotFound),
    };
    Ok(log_decision(principal, config, action, decision))
  }

  /// Decide against an instance already in hand, which need not be stored
  /// yet. Cannot fail: directory problems resolve to "no roles".
  pub async fn authorize_instance(
    &self,
    principal: &Principal,
    instance: &EntityInstance,
    action: Action,
  ) -> AccessDecision {
    let Some(config) = self.registry.lookup_enabled(&instance.type_key) else {
      return if self.registry.lookup(&instance.type_key).is_some() {
        AccessDecision::deny(MatchedRule::TypeDisabled)
      } else {
        AccessDecision::deny(MatchedRule::UnknownType)
      };
    };
    if principal.is_administrator() {
      return AccessDecision::allow(MatchedRule::Administrator);
    }

    if let Some(slug) = instance.slug(&config.slug_attribute) {
      let roles = self.cache.roles_for(&principal.id, &principal.email).await;
      if let Some((role, pattern)) = match_roles(&roles, config, slug) {
        return AccessDecision::allow(MatchedRule::CachedRole { role, pattern });
      }

      if roles.is_empty() && self.cache.has_live_directory() {
        let direct = self.cache.fetch_direct(&principal.id, &principal.email).await;
        if let Some((role, pattern)) = match_roles(&direct, config, slug) {
          return AccessDecision::allow(MatchedRule::DirectoryRole { role, pattern });
        }
      }
    }

    for field in &config.staff_fields {
      let referenced = instance
        .attribute(field)
        .is_some_and(|v| v.identities().iter().any(|r| r.references(&principal.id)));
      if referenced {
        return AccessDecision::allow(MatchedRule::StaffField { field: field.clone() });
      }
    }

    AccessDecision::deny(MatchedRule::NoMatch)
  }

  /// The slugs of `type_key` instances the principal may list.
  pub async fn accessible_slugs(
    &self,
    principal: &Principal,
    type_key: &str,
  ) -> Result<SlugScope> {
    let Some(config) = self.registry.lookup_enabled(type_key) else {
      return Ok(SlugScope::none());
    };
    if principal.is_administrator() {
      return Ok(SlugScope::Unrestricted);
    }

    let roles = self.cache.roles_for(&principal.id, &principal.email).await;
    let captures: Vec<SlugCapture> = config
      .access_templates
      .iter()
      .filter_map(|t| SlugCapture::from_template(t))
      .collect();
    let from_roles: BTreeSet<String> = roles
      .iter()
      .flat_map(|role| captures.iter().filter_map(move |c| c.capture(role)))
      .map(str::to_owned)
      .collect();
    if !from_roles.is_empty() {
      debug!(principal_id = %principal.id, type_key, slugs = from_roles.len(), "slugs from roles");
      return Ok(SlugScope::Slugs(from_roles));
    }

    let query = config
      .staff_fields
      .iter()
      .fold(InstanceQuery::for_type(type_key), |q, field| {
        q.any_of(AttributeFilter::References {
          key:          field.clone(),
          principal_id: principal.id.clone(),
        })
      })
      .statuses(EntityStatus::LIVE)
      .limit(STAFF_SCAN_LIMIT);
    let ids = self
      .repo
      .query(&query)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    let mut slugs = BTreeSet::new();
    for id in ids {
      let instance = self
        .repo
        .get(id)
        .await
        .map_err(|e| Error::Store(Box::new(e)))?;
      if let Some(slug) = instance.as_ref().and_then(|i| i.slug(&config.slug_attribute)) {
        slugs.insert(slug.to_owned());
      }
    }
    debug!(principal_id = %principal.id, type_key, slugs = slugs.len(), "slugs from staff scan");
    Ok(SlugScope::Slugs(slugs))
  }
}

/// First `(role, expanded template)` pair where the role falls under the
/// template for `slug`.
fn match_roles(
  roles: &[String],
  config: &EntityTypeConfig,
  slug: &str,
) -> Option<(String, String)> {
  let patterns: Vec<(String, PathPattern)> = config
    .access_templates
    .iter()
    .map(|t| {
      let expanded = expand_template(t, slug);
      let compiled = PathPattern::new(&expanded);
      (expanded, compiled)
    })
    .collect();

  roles.iter().find_map(|role| {
    patterns
      .iter()
      .find(|(_, p)| p.matches(role))
      .map(|(q, _)| (role.clone(), q.clone()))
  })
}

fn log_decision(
  principal: &Principal,
  config: &EntityTypeConfig,
  action: Action,
  decision: AccessDecision,
) -> AccessDecision {
  debug!(
    principal_id = %principal.id,
    type_key = %config.type_key,
    capability = config.capability(action),
    allowed = decision.is_allowed(),
    rule = ?decision.rule,
    "access decision",
  );
  decision
}
