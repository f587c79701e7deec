//! Handlers for `/entities/{type}` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities/{type}` | Optional `?status=draft,published` |
//! | `POST` | `/entities/{type}` | Body: `{"attributes":{…},"status":…}` |
//! | `POST` | `/entities/{type}/validate` | 422 with failing keys |
//! | `GET`  | `/entities/{type}/counts` | Per-status counts |
//! | `GET`  | `/entities/{type}/slugs` | Accessible slug scope |
//! | `GET`  | `/entities/{type}/{id}` | 403 unless readable |
//! | `PUT`  | `/entities/{type}/{id}` | Partial update |
//! | `POST` | `/entities/{type}/{id}/validate` | 422 with failing keys |
//! | `GET`  | `/entities/{type}/{id}/authorize` | `?action=read\|write\|delete` |

use std::str::FromStr as _;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;
use warden_core::{
  access::{AccessDecision, Action, SlugScope},
  attribute::AttributeMap,
  directory::RoleDirectory,
  entity::{EntityInstance, EntityStatus, StatusCounts},
  repository::ContentRepository,
};
use warden_engine::{GovernanceState, Notice, Saved, WriteOutcome};

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

// ─── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NoticeBody {
  pub code:    Notice,
  pub message: &'static str,
}

/// Body returned by every write: the stored instance, how governance
/// treated it and what the submitter should be told.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteResponse {
  /// The entity type is disabled; nothing was written.
  Skipped,
  Saved {
    instance: EntityInstance,
    state:    GovernanceState,
    notice:   Option<NoticeBody>,
  },
}

impl From<Saved> for WriteResponse {
  fn from(saved: Saved) -> Self {
    WriteResponse::Saved {
      instance: saved.instance,
      state:    saved.state,
      notice:   saved.notice.map(|n| NoticeBody { code: n, message: n.message() }),
    }
  }
}

impl From<WriteOutcome> for WriteResponse {
  fn from(outcome: WriteOutcome) -> Self {
    match outcome {
      WriteOutcome::Skipped => WriteResponse::Skipped,
      WriteOutcome::Saved(saved) => saved.into(),
    }
  }
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Comma-separated statuses; every status except `trashed` when absent.
  pub status: Option<String>,
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<EntityStatus>, ApiError> {
  let Some(raw) = raw else { return Ok(Vec::new()) };
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
      EntityStatus::from_str(s).map_err(|_| ApiError::BadRequest(format!("unknown status: {s}")))
    })
    .collect()
}

/// `GET /entities/{type}[?status=<status,…>]`
pub async fn list<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path(type_key): Path<String>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<EntityInstance>>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let statuses = parse_statuses(params.status.as_deref())?;
  let instances = state
    .warden
    .list_accessible(&principal, &type_key, &statuses)
    .await?;
  Ok(Json(instances))
}

/// `GET /entities/{type}/counts`
pub async fn counts<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path(type_key): Path<String>,
) -> Result<Json<StatusCounts>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  Ok(Json(state.warden.status_counts(&principal, &type_key).await?))
}

/// `GET /entities/{type}/slugs`
pub async fn slugs<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path(type_key): Path<String>,
) -> Result<Json<SlugScope>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  Ok(Json(state.warden.accessible_slugs(&principal, &type_key).await?))
}

// ─── Create / update ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WriteBody {
  #[serde(default)]
  pub attributes: AttributeMap,
  /// Requested status; `trashed` needs delete authority.
  #[serde(default)]
  pub status:     Option<EntityStatus>,
}

/// `POST /entities/{type}`
pub async fn create<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path(type_key): Path<String>,
  Json(body): Json<WriteBody>,
) -> Result<impl IntoResponse, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let outcome = state
    .warden
    .apply(&principal, &type_key, None, body.attributes, body.status)
    .await?;
  let status = match outcome {
    WriteOutcome::Saved(_) => StatusCode::CREATED,
    WriteOutcome::Skipped => StatusCode::OK,
  };
  Ok((status, Json(WriteResponse::from(outcome))))
}

/// `PUT /entities/{type}/{id}`
pub async fn update<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path((type_key, id)): Path<(String, Uuid)>,
  Json(body): Json<WriteBody>,
) -> Result<Json<WriteResponse>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let outcome = state
    .warden
    .apply(&principal, &type_key, Some(id), body.attributes, body.status)
    .await?;
  Ok(Json(outcome.into()))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entities/{type}/{id}`
pub async fn get_one<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path((type_key, id)): Path<(String, Uuid)>,
) -> Result<Json<EntityInstance>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  Ok(Json(state.warden.get(&principal, &type_key, id).await?))
}

// ─── Validate ─────────────────────────────────────────────────────────────────

fn validation_result(failing: Vec<String>) -> Result<Json<Value>, ApiError> {
  if failing.is_empty() {
    Ok(Json(json!({ "valid": true })))
  } else {
    Err(ApiError::Validation(failing))
  }
}

/// `POST /entities/{type}/validate`: checks a submission for a new instance.
pub async fn validate_new<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(_): CurrentPrincipal,
  Path(type_key): Path<String>,
  Json(body): Json<WriteBody>,
) -> Result<Json<Value>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  validation_result(state.warden.validate(&type_key, None, body.attributes).await?)
}

/// `POST /entities/{type}/{id}/validate`. Requires write access to `id`.
pub async fn validate<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path((type_key, id)): Path<(String, Uuid)>,
  Json(body): Json<WriteBody>,
) -> Result<Json<Value>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let decision = state
    .warden
    .authorize(&principal, &type_key, id, Action::Write)
    .await?;
  if !decision.is_allowed() {
    return Err(ApiError::Forbidden(format!("write denied ({:?})", decision.rule)));
  }
  validation_result(state.warden.validate(&type_key, Some(id), body.attributes).await?)
}

// ─── Authorize ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
  #[serde(default = "default_action")]
  pub action: Action,
}

fn default_action() -> Action { Action::Read }

/// `GET /entities/{type}/{id}/authorize[?action=<action>]`
pub async fn authorize<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path((type_key, id)): Path<(String, Uuid)>,
  Query(params): Query<AuthorizeParams>,
) -> Result<Json<AccessDecision>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let decision = state
    .warden
    .authorize(&principal, &type_key, id, params.action)
    .await?;
  Ok(Json(decision))
}
