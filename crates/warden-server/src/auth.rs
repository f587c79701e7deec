//! HTTP Basic-auth identity provider and the [`CurrentPrincipal`] extractor.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use warden_core::{directory::RoleDirectory, principal::Principal, repository::ContentRepository};

use crate::{AppState, error::ApiError, settings::PrincipalSettings};

/// Logins accepted by this server instance.
#[derive(Clone)]
pub struct AuthConfig {
  pub principals: Vec<PrincipalSettings>,
}

impl AuthConfig {
  pub fn new(principals: Vec<PrincipalSettings>) -> Self { Self { principals } }

  fn login(&self, username: &str) -> Option<&PrincipalSettings> {
    self.principals.iter().find(|p| p.username == username)
  }
}

/// The authenticated principal behind a request.
pub struct CurrentPrincipal(pub Principal);

/// Verify Basic credentials from headers and resolve the principal.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<Principal, ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let login = config.login(username).ok_or(ApiError::Unauthorized)?;

  let parsed_hash =
    PasswordHash::new(&login.password_hash).map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(login.principal())
}

impl<R, D> FromRequestParts<AppState<R, D>> for CurrentPrincipal
where
  R: ContentRepository + 'static,
  D: RoleDirectory + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<R, D>,
  ) -> Result<Self, Self::Rejection> {
    let principal = verify_auth(&parts.headers, &state.auth)?;
    Ok(CurrentPrincipal(principal))
  }
}
