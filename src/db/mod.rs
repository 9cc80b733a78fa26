//! Database module: insert models and SQL repositories.
//!
//! - `model`: input structs accepted by repository writers.
//! - `repo`: SQL-only functions that map rows into the domain types of
//!   `crate::model`.
//!
//! Callers import from `outreach_dispatch::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{NewCampaign, NewCompany, NewTemplate};
