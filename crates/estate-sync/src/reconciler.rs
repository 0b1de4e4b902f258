//! Decides how a single change event affects the rows of the current page.
//!
//! The reconciler never inserts or removes rows locally: the server decides
//! where a created row lands and what fills the gap a deleted row leaves, so
//! both always trigger a re-fetch of the current query. Only an update of a
//! row that is already visible is patched in place.

use std::fmt;

use estate_core::{ChangeEvent, Entity, EntityId};

/// Why the page must be fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchReason {
    /// A row was created somewhere in the collection.
    Created,
    /// A row was deleted, visible or not.
    Deleted,
    /// An updated row is not on the current page. It may now match the
    /// filters, or it was removed by an earlier re-fetch.
    UpdatedNotVisible,
    /// A visible row was patched while a fetch was in flight; a newer fetch
    /// replaces the page that fetch would have applied.
    FetchInFlight,
}

impl fmt::Display for RefetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefetchReason::Created => "created",
            RefetchReason::Deleted => "deleted",
            RefetchReason::UpdatedNotVisible => "updated_not_visible",
            RefetchReason::FetchInFlight => "fetch_in_flight",
        })
    }
}

/// Outcome of applying one event to a rowset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The row at `index` was replaced. No network call is needed.
    Patched { index: usize },
    /// The rowset was left untouched and exactly one re-fetch is required.
    Refetch(RefetchReason),
}

impl Reconciliation {
    pub fn needs_refetch(&self) -> bool {
        matches!(self, Reconciliation::Refetch(_))
    }
}

/// Stateless event-to-rowset policy, generic over the row type.
pub struct Reconciler<T> {
    id_of: fn(&T) -> EntityId,
}

impl<T> Reconciler<T> {
    /// Reconciler using a custom id accessor.
    pub fn with_id(id_of: fn(&T) -> EntityId) -> Self {
        Self { id_of }
    }

    /// Apply `event` to `rows`.
    ///
    /// Row order is preserved; an in-place patch does not re-sort.
    pub fn reconcile(&self, rows: &mut [T], event: ChangeEvent<T>) -> Reconciliation {
        match event {
            ChangeEvent::Updated(entity) => {
                let id = (self.id_of)(&entity);
                match rows.iter().position(|row| (self.id_of)(row) == id) {
                    Some(index) => {
                        rows[index] = entity;
                        Reconciliation::Patched { index }
                    }
                    None => Reconciliation::Refetch(RefetchReason::UpdatedNotVisible),
                }
            }
            ChangeEvent::Created(_) => Reconciliation::Refetch(RefetchReason::Created),
            ChangeEvent::Deleted(_) => Reconciliation::Refetch(RefetchReason::Deleted),
        }
    }
}

impl<T: Entity> Default for Reconciler<T> {
    fn default() -> Self {
        Self::with_id(T::id)
    }
}

impl<T> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Reconciler<T> {}

impl<T> fmt::Debug for Reconciler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}
