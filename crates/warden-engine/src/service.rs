//! [`Warden`], the facade that every caller goes through.

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use strum::IntoEnumIterator as _;
use tracing::{debug, info};
use uuid::Uuid;
use warden_access::{Authorizer, RoleCache, cache::CacheStatsSnapshot};
use warden_core::{
  access::{AccessDecision, Action, MatchedRule, SlugScope},
  attribute::{AttributeKey, AttributeMap},
  directory::RoleDirectory,
  entity::{EntityInstance, EntityStatus, StatusCounts},
  principal::Principal,
  registry::{EntityTypeConfig, Registry},
  repository::{AttributeFilter, ContentRepository, InstanceQuery},
};

use crate::{
  Error, Result,
  governance::{self, GovernanceState, Notice},
  locks::{KeyedLocks, instance_key, slug_key},
  pipeline,
};

/// A persisted write and how governance treated it.
#[derive(Debug, Clone, Serialize)]
pub struct Saved {
  pub instance: EntityInstance,
  pub state:    GovernanceState,
  pub notice:   Option<Notice>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
  /// The entity type is disabled; nothing was written.
  Skipped,
  Saved(Saved),
}

/// Writes to one instance, and creates claiming one slug, run one at a time.
pub struct Warden<R, D> {
  access: Authorizer<R, D>,
  locks:  KeyedLocks,
}

impl<R, D> Warden<R, D>
where
  R: ContentRepository,
  D: RoleDirectory,
{
  pub fn new(registry: Arc<Registry>, repo: R, cache: RoleCache<D>) -> Self {
    Self { access: Authorizer::new(registry, repo, cache), locks: KeyedLocks::default() }
  }

  pub fn registry(&self) -> &Registry { self.access.registry() }

  pub fn cache_stats(&self) -> CacheStatsSnapshot { self.access.cache().stats() }

  // ─── Access ────────────────────────────────────────────────────────────────

  pub async fn authorize(
    &self,
    principal: &Principal,
    type_key: &str,
    instance_id: Uuid,
    action: Action,
  ) -> Result<AccessDecision> {
    Ok(self.access.authorize(principal, type_key, instance_id, action).await?)
  }

  pub async fn accessible_slugs(
    &self,
    principal: &Principal,
    type_key: &str,
  ) -> Result<SlugScope> {
    Ok(self.access.accessible_slugs(principal, type_key).await?)
  }

  /// Drop the principal's cached roles and the counts derived from them.
  pub fn invalidate_role_cache(&self, principal_id: &str) {
    self.access.cache().invalidate(principal_id);
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Fetch one instance, provided the principal may read it.
  pub async fn get(
    &self,
    principal: &Principal,
    type_key: &str,
    id: Uuid,
  ) -> Result<EntityInstance> {
    self.enabled_config(type_key)?;
    let instance = self.load(type_key, id).await?;
    let decision = self
      .access
      .authorize_instance(principal, &instance, Action::Read)
      .await;
    if !decision.is_allowed() {
      return Err(Error::Denied { action: Action::Read, rule: decision.rule });
    }
    Ok(instance)
  }

  /// Instances of `type_key` the principal may see, oldest first. An empty
  /// `statuses` means every status except `Trashed`.
  pub async fn list_accessible(
    &self,
    principal: &Principal,
    type_key: &str,
    statuses: &[EntityStatus],
  ) -> Result<Vec<EntityInstance>> {
    let Some(config) = self.listable_config(type_key)? else {
      return Ok(Vec::new());
    };
    let scope = self.accessible_slugs(principal, type_key).await?;
    let live = EntityStatus::LIVE;
    let statuses = if statuses.is_empty() { &live[..] } else { statuses };
    let Some(query) = scoped_query(config, &scope, statuses.iter().copied()) else {
      return Ok(Vec::new());
    };

    let ids = self.query(&query).await?;
    let mut instances = Vec::with_capacity(ids.len());
    for id in ids {
      if let Some(instance) = self.access.repository().get(id).await.map_err(store_err)? {
        instances.push(instance);
      }
    }
    Ok(instances)
  }

  /// Per-status counts of the instances the principal may see. Instances
  /// with a pending changeset also count under `PendingReview`.
  pub async fn status_counts(
    &self,
    principal: &Principal,
    type_key: &str,
  ) -> Result<StatusCounts> {
    let Some(config) = self.listable_config(type_key)? else {
      return Ok(StatusCounts::new());
    };
    let cache = self.access.cache();
    if let Some(counts) = cache.cached_counts(&principal.id, type_key) {
      return Ok(counts);
    }

    let scope = self.accessible_slugs(principal, type_key).await?;
    let mut counts = StatusCounts::new();
    for status in EntityStatus::iter() {
      let n = match scoped_query(config, &scope, [status]) {
        Some(q) => self.query(&q).await?.len(),
        None => 0,
      };
      counts.insert(status, n);
    }
    if let Some(q) = scoped_query(config, &scope, EntityStatus::LIVE) {
      let pending = self.query(&q.pending(true)).await?.len();
      *counts.entry(EntityStatus::PendingReview).or_default() += pending;
    }

    cache.store_counts(&principal.id, type_key, counts.clone());
    Ok(counts)
  }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Keys of `submitted` that would fail validation against the stored
  /// instance `id` (or a new one).
  pub async fn validate(
    &self,
    type_key: &str,
    id: Option<Uuid>,
    submitted: AttributeMap,
  ) -> Result<Vec<AttributeKey>> {
    let config = self.enabled_config(type_key)?;
    let existing = match id {
      Some(id) => Some(self.load(type_key, id).await?),
      None => None,
    };
    let prepared = pipeline::prepare(config, submitted);
    let submitted = pipeline::effective(config, prepared, existing.as_ref(), true);
    let slug = submitted_slug(config, &submitted);
    let slug_taken = self.slug_taken(config, slug.as_deref(), existing.as_ref()).await?;
    Ok(pipeline::check(
      config,
      self.slug_regex(type_key)?,
      &submitted,
      existing.as_ref(),
      slug_taken,
    ))
  }

  /// Validate and persist a submission, creating a new draft when `id` is
  /// `None`. Moving an instance into or out of the trash requires delete
  /// authority.
  pub async fn apply(
    &self,
    actor: &Principal,
    type_key: &str,
    id: Option<Uuid>,
    submitted: AttributeMap,
    requested: Option<EntityStatus>,
  ) -> Result<WriteOutcome> {
    let Some(config) = self.registry().lookup(type_key) else {
      return Err(Error::UnknownType(type_key.to_owned()));
    };
    if !self.registry().is_enabled(type_key) {
      debug!(type_key, "entity type disabled; write skipped");
      return Ok(WriteOutcome::Skipped);
    }

    let _instance_lock = match id {
      Some(id) => Some(self.locks.lock(instance_key(id)).await),
      None => None,
    };
    let (existing, is_new) = match id {
      Some(id) => (self.load(type_key, id).await?, false),
      None => (EntityInstance::new(type_key), true),
    };
    let trashed = existing.status == EntityStatus::Trashed;
    let action = match requested {
      Some(EntityStatus::Trashed) => Action::Delete,
      Some(_) if trashed => Action::Delete,
      _ => Action::Write,
    };

    let prepared = pipeline::prepare(config, submitted);
    let submitted =
      pipeline::effective(config, prepared, Some(&existing), actor.is_elevated());

    // A new instance is judged by what it will contain; an existing one by
    // what it contains now.
    let decision = if is_new {
      let mut candidate = existing.clone();
      candidate.attributes.extend(submitted.clone());
      self.access.authorize_instance(actor, &candidate, action).await
    } else {
      self.access.authorize_instance(actor, &existing, action).await
    };
    debug!(
      principal_id = %actor.id,
      type_key,
      capability = config.capability(action),
      allowed = decision.is_allowed(),
      rule = ?decision.rule,
      "write authorization",
    );
    if !decision.is_allowed() {
      return Err(Error::Denied { action, rule: decision.rule });
    }

    let slug = submitted_slug(config, &submitted);
    let _slug_lock = match &slug {
      Some(slug) => Some(self.locks.lock(slug_key(type_key, slug)).await),
      None => None,
    };
    let slug_taken = self.slug_taken(config, slug.as_deref(), Some(&existing)).await?;
    let failing = pipeline::check(
      config,
      self.slug_regex(type_key)?,
      &submitted,
      Some(&existing),
      slug_taken,
    );
    if !failing.is_empty() {
      return Err(Error::Validation(failing));
    }

    let merged = pipeline::merge(config, &existing.attributes, submitted, &actor.id);
    // An administrator lifts a drafted hold, unless it is their own.
    let review_held = existing
      .review_requested_by
      .as_deref()
      .is_some_and(|by| !decision.is_administrative() || by.eq_ignore_ascii_case(&actor.id));
    let state = governance::decide(
      existing.status,
      merged.staff_fields_dirty(),
      decision.is_administrative(),
      merged.self_promoted,
      review_held,
    );
    if state != GovernanceState::Clean {
      info!(
        instance_id = %existing.id,
        type_key,
        principal_id = %actor.id,
        %state,
        dirty = ?merged.dirty_fields,
        self_promoted = merged.self_promoted,
        review_held,
        "staff change gated",
      );
    }

    let (instance, notice) =
      governance::settle(existing, merged, state, requested, &actor.id, Utc::now());
    self.persist(&instance).await?;
    Ok(WriteOutcome::Saved(Saved { instance, state, notice }))
  }

  /// Apply the pending changeset, or lift a drafted hold, and publish.
  /// Administrators only.
  pub async fn approve_changeset(
    &self,
    type_key: &str,
    id: Uuid,
    actor: &Principal,
  ) -> Result<Saved> {
    let config = self.enabled_config(type_key)?;
    let _lock = self.locks.lock(instance_key(id)).await;
    let instance = self.load(type_key, id).await?;
    if !actor.is_administrator() {
      return Err(Error::Denied { action: Action::Write, rule: MatchedRule::NoMatch });
    }

    let instance = governance::approve(config, instance, Utc::now())
      .ok_or(Error::NoPendingChangeset(id))?;
    self.persist(&instance).await?;
    info!(instance_id = %id, principal_id = %actor.id, "changeset approved");
    Ok(Saved { instance, state: GovernanceState::Resolved, notice: None })
  }

  /// Discard the pending changeset. Administrators may reject any
  /// changeset; a submitter may withdraw their own.
  pub async fn reject_changeset(
    &self,
    type_key: &str,
    id: Uuid,
    actor: &Principal,
  ) -> Result<Saved> {
    self.enabled_config(type_key)?;
    let _lock = self.locks.lock(instance_key(id)).await;
    let instance = self.load(type_key, id).await?;
    let Some(pending) = &instance.pending_changeset else {
      return Err(Error::NoPendingChangeset(id));
    };
    let own = pending.submitted_by.eq_ignore_ascii_case(&actor.id);
    if !actor.is_administrator() && !own {
      return Err(Error::Denied { action: Action::Write, rule: MatchedRule::NoMatch });
    }

    let instance =
      governance::reject(instance, Utc::now()).ok_or(Error::NoPendingChangeset(id))?;
    self.persist(&instance).await?;
    info!(instance_id = %id, principal_id = %actor.id, withdrawn = own, "changeset rejected");
    Ok(Saved { instance, state: GovernanceState::Resolved, notice: None })
  }

  // ─── Helpers ───────────────────────────────────────────────────────────────

  fn enabled_config(&self, type_key: &str) -> Result<&EntityTypeConfig> {
    match self.listable_config(type_key)? {
      Some(config) => Ok(config),
      None => Err(Error::TypeDisabled(type_key.to_owned())),
    }
  }

  /// `None` for a disabled type, an error for an unknown one.
  fn listable_config(&self, type_key: &str) -> Result<Option<&EntityTypeConfig>> {
    if self.registry().lookup(type_key).is_none() {
      return Err(Error::UnknownType(type_key.to_owned()));
    }
    Ok(self.registry().lookup_enabled(type_key))
  }

  fn slug_regex(&self, type_key: &str) -> Result<&Regex> {
    self
      .registry()
      .slug_regex(type_key)
      .ok_or_else(|| Error::UnknownType(type_key.to_owned()))
  }

  /// The stored instance `id`, which must be of `type_key`.
  async fn load(&self, type_key: &str, id: Uuid) -> Result<EntityInstance> {
    self
      .access
      .repository()
      .get(id)
      .await
      .map_err(store_err)?
      .filter(|i| i.type_key == type_key)
      .ok_or(Error::NotFound(id))
  }

  async fn query(&self, query: &InstanceQuery) -> Result<Vec<Uuid>> {
    self.access.repository().query(query).await.map_err(store_err)
  }

  async fn persist(&self, instance: &EntityInstance) -> Result<()> {
    self.access.repository().put(instance).await.map_err(store_err)?;
    self.access.cache().invalidate_counts(&instance.type_key);
    Ok(())
  }

  /// Whether another live instance already uses `slug`.
  async fn slug_taken(
    &self,
    config: &EntityTypeConfig,
    slug: Option<&str>,
    existing: Option<&EntityInstance>,
  ) -> Result<bool> {
    let Some(slug) = slug else {
      return Ok(false);
    };

    let mut query = InstanceQuery::for_type(&config.type_key)
      .statuses(EntityStatus::LIVE)
      .all_of(AttributeFilter::Equals {
        key:   config.slug_attribute.clone(),
        value: slug.to_owned(),
      })
      .limit(1);
    if let Some(existing) = existing {
      query = query.excluding(existing.id);
    }
    Ok(!self.query(&query).await?.is_empty())
  }
}

/// The non-blank slug carried by a submission.
fn submitted_slug(config: &EntityTypeConfig, submitted: &AttributeMap) -> Option<String> {
  submitted
    .get(&config.slug_attribute)
    .and_then(|v| v.as_scalar())
    .filter(|s| !s.trim().is_empty())
    .map(|s| s.into_owned())
}

/// The query for instances in `scope`, or `None` when the scope is empty.
fn scoped_query(
  config: &EntityTypeConfig,
  scope: &SlugScope,
  statuses: impl IntoIterator<Item = EntityStatus>,
) -> Option<InstanceQuery> {
  let query = InstanceQuery::for_type(&config.type_key).statuses(statuses);
  match scope {
    SlugScope::Unrestricted => Some(query),
    SlugScope::Slugs(slugs) if slugs.is_empty() => None,
    SlugScope::Slugs(slugs) => Some(query.all_of(AttributeFilter::OneOf {
      key:    config.slug_attribute.clone(),
      values: slugs.iter().cloned().collect(),
    })),
  }
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}
