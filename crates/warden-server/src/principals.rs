//! Handlers for `/principals` endpoints and role-cache diagnostics.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use warden_access::cache::CacheStatsSnapshot;
use warden_core::{directory::RoleDirectory, principal::Principal, repository::ContentRepository};

use crate::{AppState, auth::CurrentPrincipal, error::ApiError};

/// `GET /principals/me`
pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<Principal> {
  Json(principal)
}

/// `DELETE /principals/{id}/role-cache`. Administrators only.
pub async fn invalidate_role_cache<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  if !principal.is_administrator() {
    return Err(ApiError::Forbidden("administrator required".to_string()));
  }
  state.warden.invalidate_role_cache(&id);
  tracing::info!(principal_id = %id, by = %principal.id, "role cache invalidated");
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /diagnostics/role-cache`. Administrators only.
pub async fn cache_stats<R, D>(
  State(state): State<AppState<R, D>>,
  CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<CacheStatsSnapshot>, ApiError>
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  if !principal.is_administrator() {
    return Err(ApiError::Forbidden("administrator required".to_string()));
  }
  Ok(Json(state.warden.cache_stats()))
}
