//! Error type for `warden-access`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("could not build directory client: {0}")]
  HttpClient(#[source] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
