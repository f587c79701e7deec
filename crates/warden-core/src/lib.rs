//! Core types and trait definitions for Warden.
//!
//! Holds the entity-type registry, attribute and field-kind semantics, and
//! the traits through which the engine reaches the content repository and the
//! role directory. No HTTP or database code lives here.

#![allow(async_fn_in_trait)]

pub mod access;
pub mod attribute;
pub mod catalog;
pub mod directory;
pub mod entity;
pub mod error;
pub mod field;
pub mod principal;
pub mod registry;
pub mod repository;

pub use error::{Error, Result};
