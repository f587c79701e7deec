//! Access resolution for Warden: role-path patterns, the per-principal role
//! cache, the HTTP directory client and the [`Authorizer`].

#![allow(async_fn_in_trait)]

pub mod cache;
pub mod directory;
pub mod error;
pub mod pattern;
pub mod resolve;

pub use cache::{RoleCache, RoleCacheConfig};
pub use directory::{HttpDirectory, HttpDirectoryConfig};
pub use error::{Error, Result};
pub use resolve::Authorizer;
