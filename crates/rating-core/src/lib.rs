//! Core domain model for rating-tracker
//!
//! This crate defines the types shared by the fetch engine and its callers:
//! the six external data providers, the canonical stock record, the partial
//! attribute patches providers produce, and the access rights checked by the
//! route table.

pub mod access;
pub mod error;
pub mod provider;
pub mod ratings;
pub mod scope;
pub mod stock;

pub use access::AccessRights;
pub use error::{Error, Result};
pub use provider::Provider;
pub use ratings::{AnalystRating, MsciEsgRating};
pub use scope::Scope;
pub use stock::{Stock, StockPatch};
