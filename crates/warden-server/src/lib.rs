//! JSON HTTP surface for Warden.
//!
//! Exposes an axum [`Router`] over a [`Warden`] facade. Every route except
//! `/health` sits behind HTTP Basic authentication against the configured
//! principals.

pub mod auth;
pub mod changesets;
pub mod entities;
pub mod error;
pub mod principals;
pub mod settings;

pub use error::ApiError;
pub use settings::ServerConfig;

use std::sync::Arc;

use axum::{
  Json,
  Router,
  routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use warden_core::{directory::RoleDirectory, repository::ContentRepository};
use warden_engine::Warden;

use auth::AuthConfig;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<R, D> {
  pub warden: Arc<Warden<R, D>>,
  pub auth:   Arc<AuthConfig>,
}

impl<R, D> Clone for AppState<R, D> {
  fn clone(&self) -> Self {
    Self { warden: Arc::clone(&self.warden), auth: Arc::clone(&self.auth) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Warden API.
pub fn router<R, D>(state: AppState<R, D>) -> Router
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  Router::new()
    .route("/health", get(health))
    // Entities
    .route("/entities/{type_key}", get(entities::list::<R, D>).post(entities::create::<R, D>))
    .route("/entities/{type_key}/validate", post(entities::validate_new::<R, D>))
    .route("/entities/{type_key}/counts", get(entities::counts::<R, D>))
    .route("/entities/{type_key}/slugs", get(entities::slugs::<R, D>))
    .route(
      "/entities/{type_key}/{id}",
      get(entities::get_one::<R, D>).put(entities::update::<R, D>),
    )
    .route("/entities/{type_key}/{id}/validate", post(entities::validate::<R, D>))
    .route("/entities/{type_key}/{id}/authorize", get(entities::authorize::<R, D>))
    // Changesets
    .route("/entities/{type_key}/{id}/changeset/approve", post(changesets::approve::<R, D>))
    .route("/entities/{type_key}/{id}/changeset/reject", post(changesets::reject::<R, D>))
    // Principals
    .route("/principals/me", get(principals::me))
    .route("/principals/{id}/role-cache", delete(principals::invalidate_role_cache::<R, D>))
    .route("/diagnostics/role-cache", get(principals::cache_stats::<R, D>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// `GET /health`: unauthenticated liveness probe.
async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
