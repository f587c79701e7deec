//! The external role directory, seen from the outside.
//!
//! The directory maps a principal's email (plus this deployment's client id)
//! to the slash-delimited role paths the principal holds, e.g.
//! `chronicle/abc/hst`. Its resolution logic is not ours.

use std::{future::Future, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
  #[error("directory request failed: {0}")]
  Transport(String),

  #[error("directory answered with status {0}")]
  Status(u16),

  #[error("directory response malformed: {0}")]
  Malformed(String),

  #[error("directory did not answer within {0:?}")]
  Timeout(Duration),
}

/// Lookup of role paths by email.
pub trait RoleDirectory: Send + Sync {
  fn roles_by_email<'a>(
    &'a self,
    email: &'a str,
    client_id: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, DirectoryError>> + Send + 'a;
}
