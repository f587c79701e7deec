//! Handlers for resolving a pending changeset.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/entities/{type}/{id}/changeset/approve` | Administrators only |
//! | `POST` | `/entities/{type}/{id}/changeset/reject` | Administrators or the submitter |

use axum::{
  Json,
  extract::{Path, State},
};
use uuid::Uuid;
use warden_core::{directory::RoleDirectory, repository::ContentRepository};

use crate::{AppState, auth::CurrentPrincipal, entities::WriteResponse, error::ApiError};

/// `POST /entities/{type}/{id}/changeset/approve`
pub async fn approve<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path((type_key, id)): Path<(String, Uuid)>,
) -> Result<Json<WriteResponse>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let saved = state
    .warden
    .approve_changeset(&type_key, id, &principal)
    .await?;
  Ok(Json(saved.into()))
}

/// `POST /entities/{type}/{id}/changeset/reject`
pub async fn reject<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path((type_key, id)): Path<(String, Uuid)>,
) -> Result<Json<WriteResponse>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  let saved = state
    .warden
    .reject_changeset(&type_key, id, &principal)
    .await?;
  Ok(Json(saved.into()))
}
