//! Core types shared across tuplegate crates.
//!
//! Holds the `Result` alias used with rootcause and the identifiers that
//! scope every authorization call to one store and one model version.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AuthorizationModelId, ParseIdError, StoreId};
