//! Collection view: the query a screen shows and the rows last fetched for it.
//!
//! A [`CollectionView`] is the single owner of one screen's query and
//! rowset. Every fetch takes a sequence number; a result is applied only
//! if no newer fetch has been issued since (last fetch wins). Failures are
//! published as notifications and the previous rowset stays in place.
//!
//! State lives behind a short-lived mutex that is never held across an
//! `.await`, so a view can be shared between the UI side and the live
//! update task via `Arc`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, warn};

use estate_core::{defaults, ChangeEvent, CollectionFetcher, Entity, Error, Query, Result};

use crate::notify::{Notification, Notifier};
use crate::reconciler::{Reconciler, Reconciliation, RefetchReason};

/// What happened to one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result replaced the rowset.
    Applied,
    /// A newer fetch was issued while this one was in flight; its result
    /// (success or failure) was discarded.
    Superseded,
    /// The fetch failed; an error notification was published.
    Failed,
}

/// Point-in-time copy of a view's state.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot<T> {
    pub query: Query,
    pub rows: Vec<T>,
    pub total_pages: u32,
    pub loading: bool,
    /// Incremented every time the rowset changes.
    pub revision: u64,
}

struct ViewState<T> {
    query: Query,
    rows: Vec<T>,
    total_pages: u32,
    loading: bool,
    /// Sequence number of the most recently issued fetch.
    issued: u64,
    revision: u64,
}

/// Clears `loading` if a fetch is dropped before it completes, for example
/// when the task awaiting it is aborted.
struct PendingFetch<'a, T> {
    state: &'a Mutex<ViewState<T>>,
    seq: u64,
    armed: bool,
}

impl<T> Drop for PendingFetch<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.issued == self.seq {
            state.loading = false;
        }
    }
}

/// Paginated, filtered, sorted view of one remote collection.
pub struct CollectionView<T, F> {
    fetcher: F,
    reconciler: Reconciler<T>,
    state: Mutex<ViewState<T>>,
    notifier: Notifier,
    revisions: watch::Sender<u64>,
}

impl<T, F> CollectionView<T, F>
where
    T: Entity,
    F: CollectionFetcher<T>,
{
    /// Create an empty view. Nothing is fetched until [`refresh`](Self::refresh).
    pub fn new(fetcher: F, query: Query) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            fetcher,
            reconciler: Reconciler::default(),
            state: Mutex::new(ViewState {
                query,
                rows: Vec::new(),
                total_pages: 1,
                loading: false,
                issued: 0,
                revision: 0,
            }),
            notifier: Notifier::new(defaults::NOTIFICATION_CAPACITY),
            revisions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn snapshot(&self) -> ViewSnapshot<T> {
        let state = self.lock();
        ViewSnapshot {
            query: state.query.clone(),
            rows: state.rows.clone(),
            total_pages: state.total_pages,
            loading: state.loading,
            revision: state.revision,
        }
    }

    pub fn rows(&self) -> Vec<T> {
        self.lock().rows.clone()
    }

    pub fn query(&self) -> Query {
        self.lock().query.clone()
    }

    pub fn total_pages(&self) -> u32 {
        self.lock().total_pages
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Receiver that changes whenever the rowset changes.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    // =========================================================================
    // Fetching
    // =========================================================================

    /// Fetch the page described by the current query.
    pub async fn refresh(&self) -> FetchOutcome {
        let (seq, query) = {
            let mut state = self.lock();
            state.issued += 1;
            state.loading = true;
            (state.issued, state.query.clone())
        };

        let kind = T::KIND;
        let start = Instant::now();
        debug!(
            subsystem = "sync",
            component = "view",
            op = "refresh",
            entity = %kind,
            fetch_seq = seq,
            page = query.page,
            page_size = query.page_size,
            "Fetching page"
        );

        let mut pending = PendingFetch {
            state: &self.state,
            seq,
            armed: true,
        };
        let result = self.fetcher.fetch(&query).await;
        pending.armed = false;

        let mut state = self.lock();
        if state.issued != seq {
            debug!(
                subsystem = "sync",
                component = "view",
                entity = %kind,
                fetch_seq = seq,
                latest_seq = state.issued,
                "Discarding superseded fetch result"
            );
            return FetchOutcome::Superseded;
        }
        state.loading = false;

        match result {
            Ok(page) => {
                let page = page.normalized(&query);
                state.rows = page.items;
                state.total_pages = page.total_pages;
                state.revision += 1;
                let revision = state.revision;
                let result_count = state.rows.len();
                drop(state);

                self.revisions.send_replace(revision);
                debug!(
                    subsystem = "sync",
                    component = "view",
                    entity = %kind,
                    fetch_seq = seq,
                    result_count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Applied page"
                );
                FetchOutcome::Applied
            }
            Err(e) => {
                drop(state);
                error!(
                    subsystem = "sync",
                    component = "view",
                    entity = %kind,
                    fetch_seq = seq,
                    error = %e,
                    "Fetch failed, keeping previous rows"
                );
                self.notifier.notify(Notification::from_error(&e));
                FetchOutcome::Failed
            }
        }
    }

    // =========================================================================
    // Query edits
    // =========================================================================

    /// Show another page.
    pub async fn set_page(&self, page: u32) -> FetchOutcome {
        self.lock().query.set_page(page);
        self.refresh().await
    }

    /// Column header click.
    pub async fn toggle_sort(&self, column: &str) -> FetchOutcome {
        self.lock().query.toggle_sort(column);
        self.refresh().await
    }

    /// Add a filter and re-fetch. Duplicate or disallowed columns are rejected.
    pub async fn add_filter(&self, column: &str, value: &str) -> Result<FetchOutcome> {
        self.edit_query("add_filter", |q| q.filters.add(column, value))
            .await
    }

    pub async fn set_filter_value(&self, column: &str, value: &str) -> Result<FetchOutcome> {
        self.edit_query("set_filter_value", |q| q.filters.set_value(column, value))
            .await
    }

    /// Retarget the filter at `index` to another column.
    pub async fn set_filter_column(&self, index: usize, column: &str) -> Result<FetchOutcome> {
        self.edit_query("set_filter_column", |q| q.filters.set_column(index, column))
            .await
    }

    pub async fn remove_filter(&self, column: &str) -> Result<FetchOutcome> {
        self.edit_query("remove_filter", |q| {
            q.filters
                .remove(column)
                .map(|_| ())
                .ok_or_else(|| Error::InvalidInput(format!("No filter on column {}", column)))
        })
        .await
    }

    /// Add an empty filter on the first unused column.
    ///
    /// Empty filters do not change the result, so nothing is fetched.
    pub fn add_next_filter(&self) -> Result<&'static str> {
        let result = self.lock().query.add_next_filter(T::KIND);
        if let Err(e) = &result {
            self.notifier.notify(Notification::from_error(e));
        }
        result
    }

    /// Apply `edit` to a copy of the query, validate it, then commit and re-fetch.
    async fn edit_query(
        &self,
        op: &'static str,
        edit: impl FnOnce(&mut Query) -> Result<()>,
    ) -> Result<FetchOutcome> {
        let committed = {
            let mut state = self.lock();
            let mut query = state.query.clone();
            match edit(&mut query).and_then(|()| query.validate(T::KIND)) {
                Ok(()) => {
                    state.query = query;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = committed {
            let kind = T::KIND;
            warn!(subsystem = "sync", component = "view", op, entity = %kind, error = %e, "Query edit rejected");
            self.notifier.notify(Notification::from_error(&e));
            return Err(e);
        }
        Ok(self.refresh().await)
    }

    // =========================================================================
    // Live updates
    // =========================================================================

    /// Apply one change event: patch in place or re-fetch the current query.
    ///
    /// A patch made while a fetch is in flight would be overwritten by that
    /// fetch's older page, so the row is patched and a newer fetch is issued
    /// to supersede it; the outcome is then
    /// `Refetch(RefetchReason::FetchInFlight)`.
    pub async fn handle_event(&self, event: ChangeEvent<T>) -> Reconciliation {
        let kind = T::KIND;
        let change = event.kind();
        let (outcome, in_flight) = {
            let mut state = self.lock();
            let outcome = self.reconciler.reconcile(&mut state.rows, event);
            if let Reconciliation::Patched { .. } = outcome {
                state.revision += 1;
                self.revisions.send_replace(state.revision);
            }
            (outcome, state.loading)
        };

        match outcome {
            Reconciliation::Patched { index } if in_flight => {
                debug!(subsystem = "sync", component = "reconciler", entity = %kind, change = ?change, index, "Patched row during a fetch, re-fetching");
                self.notifier
                    .notify(Notification::info(format!("{} updated", kind.label())));
                self.refresh().await;
                return Reconciliation::Refetch(RefetchReason::FetchInFlight);
            }
            Reconciliation::Patched { index } => {
                debug!(subsystem = "sync", component = "reconciler", entity = %kind, change = ?change, index, "Patched row in place");
                self.notifier
                    .notify(Notification::info(format!("{} updated", kind.label())));
            }
            Reconciliation::Refetch(reason) => {
                debug!(subsystem = "sync", component = "reconciler", entity = %kind, change = ?change, %reason, "Re-fetching current page");
                self.refresh().await;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFetcher;
    use estate_core::{House, User};

    fn house(id: i64, name: &str) -> House {
        House {
            id,
            name: name.to_string(),
            year: Some(2000),
            number_of_flats_on_floor: Some(4),
            user: User {
                id: 1,
                username: "alice".to_string(),
                role: None,
            },
        }
    }

    #[tokio::test]
    async fn test_refresh_applies_page() {
        let fetcher = MockFetcher::new().with_page(vec![house(1, "a"), house(2, "b")], 2);
        let view = CollectionView::new(fetcher, Query::new());

        assert_eq!(view.refresh().await, FetchOutcome::Applied);
        let snap = view.snapshot();
        assert_eq!(snap.rows.len(), 2);
        assert_eq!(snap.total_pages, 2);
        assert!(!snap.loading);
        assert_eq!(snap.revision, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_rows_and_notifies() {
        let fetcher = MockFetcher::new()
            .with_page(vec![house(1, "a")], 1)
            .with_failure(Error::Server {
                status: 500,
                message: "Database unavailable".to_string(),
            });
        let view = CollectionView::new(fetcher, Query::new());
        let mut notes = view.subscribe_notifications();

        view.refresh().await;
        assert_eq!(view.refresh().await, FetchOutcome::Failed);

        assert_eq!(view.rows(), vec![house(1, "a")]);
        assert!(!view.is_loading());
        let note = notes.recv().await.unwrap();
        assert!(note.is_error());
        assert_eq!(note.message, "Database unavailable");
    }

    #[tokio::test]
    async fn test_duplicate_filter_is_rejected_without_fetch() {
        let fetcher = MockFetcher::<House>::new();
        let view = CollectionView::new(fetcher.clone(), Query::new());

        view.add_filter("name", "Tower").await.unwrap();
        let err = view.add_filter("name", "Other").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateFilter(_)));
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(view.query().filters.len(), 1);
    }

    #[tokio::test]
    async fn test_disallowed_column_is_rejected() {
        let view = CollectionView::new(MockFetcher::<House>::new(), Query::new());
        let err = view.add_filter("price", "10").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(view.query().filters.is_empty());
    }

    #[tokio::test]
    async fn test_query_edits_refetch_with_new_query() {
        let fetcher = MockFetcher::<House>::new();
        let view = CollectionView::new(fetcher.clone(), Query::new());

        view.set_page(2).await;
        view.toggle_sort("name").await;
        view.add_filter("year", "1999").await.unwrap();
        view.set_filter_value("year", "2001").await.unwrap();
        view.remove_filter("year").await.unwrap();

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0].page, 2);
        assert_eq!(calls[1].sort_param(), "name,asc");
        assert_eq!(calls[3].filter_params()["year"], "2001");
        assert!(calls[4].filters.is_empty());
    }

    #[tokio::test]
    async fn test_add_next_filter_does_not_fetch() {
        let fetcher = MockFetcher::<House>::new();
        let view = CollectionView::new(fetcher.clone(), Query::new());
        assert_eq!(view.add_next_filter().unwrap(), "id");
        assert_eq!(view.add_next_filter().unwrap(), "name");
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_fetch_clears_loading() {
        let fetcher = MockFetcher::new().with_delayed_page(
            vec![house(1, "a")],
            1,
            std::time::Duration::from_secs(60),
        );
        let view = CollectionView::new(fetcher, Query::new());

        tokio::select! {
            _ = view.refresh() => panic!("fetch should still be pending"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
        }
        assert!(!view.is_loading());
        assert!(view.rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_superseded_fetch_keeps_loading() {
        let fetcher = MockFetcher::new()
            .with_delayed_page(vec![house(1, "a")], 1, std::time::Duration::from_secs(60))
            .with_delayed_page(vec![house(2, "b")], 1, std::time::Duration::from_secs(1));
        let view = CollectionView::new(fetcher, Query::new());

        let mut first = Box::pin(view.refresh());
        let mut second = Box::pin(view.refresh());
        tokio::select! {
            _ = &mut first => panic!("fetch should still be pending"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
        }
        tokio::select! {
            _ = &mut second => panic!("fetch should still be pending"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
        }
        drop(first);
        assert!(view.is_loading());
        assert_eq!(second.await, FetchOutcome::Applied);
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn test_patch_bumps_revision_and_notifies() {
        let fetcher = MockFetcher::new().with_page(vec![house(1, "a")], 1);
        let view = CollectionView::new(fetcher.clone(), Query::new());
        view.refresh().await;
        let mut notes = view.subscribe_notifications();
        let mut revisions = view.watch();

        let outcome = view.handle_event(ChangeEvent::Updated(house(1, "renamed"))).await;
        assert_eq!(outcome, Reconciliation::Patched { index: 0 });
        assert_eq!(view.rows()[0].name, "renamed");
        assert_eq!(fetcher.call_count(), 1);
        assert!(revisions.has_changed().unwrap());
        assert_eq!(*revisions.borrow_and_update(), 2);
        assert_eq!(notes.recv().await.unwrap().message, "House updated");
    }
}
