//! The Warden engine: the field save/validate pipeline, staff-change
//! governance, and the [`Warden`] facade tying them to access resolution.

pub mod error;
pub mod governance;
mod locks;
pub mod pipeline;
pub mod service;

pub use error::{Error, Result};
pub use governance::{GovernanceState, Notice};
pub use service::{Saved, Warden, WriteOutcome};
