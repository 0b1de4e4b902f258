//! Core traits for estate-sync abstractions.
//!
//! These traits define the seams between the synchronization core and its
//! collaborators, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::{EntityId, EntityKind, User};
use crate::query::{PageResult, Query};

/// A record of a remote collection, identified by a unique integer id.
pub trait Entity: Clone + Send + Sync + DeserializeOwned + 'static {
    /// Collection this record type belongs to.
    const KIND: EntityKind;

    /// Backend-assigned identifier.
    fn id(&self) -> EntityId;

    /// Owning user, if the payload carries one.
    fn owner(&self) -> Option<&User> {
        None
    }
}

/// Paginated, filtered, sorted access to one remote collection.
///
/// Implementations return data only; applying it to shared view state is the
/// caller's job.
#[async_trait]
pub trait CollectionFetcher<T: Entity>: Send + Sync {
    /// Fetch exactly the page described by `query`.
    async fn fetch(&self, query: &Query) -> Result<PageResult<T>>;
}
