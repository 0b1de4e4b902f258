//! # estate-core
//!
//! Core types, traits, and abstractions for estate-sync.
//!
//! This crate provides the domain models of the property catalog, the query
//! and page types shared by fetchers and views, push-channel change events,
//! the session context, and the common error type.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod query;
pub mod session;
pub mod timestamp;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{ChangeEvent, ChangeKind, Topic};
pub use models::*;
pub use query::{Filter, FilterSet, PageResult, Query, SortDirection};
pub use session::{decode_claims, Claims, Session};
pub use traits::*;
