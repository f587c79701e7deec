//! [`HttpDirectory`]: the role directory over HTTP/JSON.
//!
//! `POST {base_url}/roles` with `{"email": .., "client_id": ..}` answers
//! `{"roles": ["chronicle/abc/hst", ..]}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_core::directory::{DirectoryError, RoleDirectory};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
  pub base_url: String,
  /// Sent as `x-api-key` when set.
  pub api_key:  Option<String>,
  pub timeout:  Duration,
}

#[derive(Serialize)]
struct RolesRequest<'a> {
  email:     &'a str,
  client_id: &'a str,
}

#[derive(Deserialize)]
struct RolesResponse {
  #[serde(default)]
  roles: Vec<String>,
}

pub struct HttpDirectory {
  client:  reqwest::Client,
  url:     String,
  api_key: Option<String>,
}

impl HttpDirectory {
  pub fn new(config: HttpDirectoryConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(Error::HttpClient)?;
    Ok(Self {
      client,
      url: format!("{}/roles", config.base_url.trim_end_matches('/')),
      api_key: config.api_key,
    })
  }
}

impl RoleDirectory for HttpDirectory {
  async fn roles_by_email(
    &self,
    email: &str,
    client_id: &str,
  ) -> Result<Vec<String>, DirectoryError> {
    let mut request = self
      .client
      .post(&self.url)
      .json(&RolesRequest { email, client_id });
    if let Some(key) = &self.api_key {
      request = request.header("x-api-key", key);
    }

    let response = request
      .send()
      .await
      .map_err(|e| DirectoryError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(DirectoryError::Status(status.as_u16()));
    }

    let body: RolesResponse = response
      .json()
      .await
      .map_err(|e| DirectoryError::Malformed(e.to_string()))?;

    debug!(email, roles = body.roles.len(), "directory answered");
    Ok(body.roles)
  }
}
