//! Change-event scenarios against a collection view backed by a scripted fetcher.

use chrono::{TimeZone, Utc};
use estate_core::{ChangeEvent, Coordinates, Error, Flat, Query, User, View};
use estate_sync::mock::MockFetcher;
use estate_sync::{CollectionView, FetchOutcome, Reconciliation, RefetchReason};

fn flat(id: i64) -> Flat {
    Flat {
        id,
        name: format!("Flat {}", id),
        coordinates: Coordinates { x: id, y: -id },
        creation_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        area: 30.0 + id as f64,
        price: 1000.0 * id as f64,
        balcony: Some(id % 2 == 0),
        time_to_metro_on_foot: Some(5),
        number_of_rooms: Some(2),
        number_of_bathrooms: Some(1),
        time_to_metro_by_transport: Some(2.5),
        view: View::Normal,
        house: None,
        user: User {
            id: 1,
            username: "alice".to_string(),
            role: None,
        },
    }
}

fn flats(ids: impl IntoIterator<Item = i64>) -> Vec<Flat> {
    ids.into_iter().map(flat).collect()
}

fn ids(rows: &[Flat]) -> Vec<i64> {
    rows.iter().map(|f| f.id).collect()
}

#[tokio::test]
async fn test_update_patches_in_place_then_create_refetches() {
    let fetcher = MockFetcher::new().with_page(flats(1..=10), 3);
    let view = CollectionView::new(fetcher.clone(), Query::new());

    assert_eq!(view.refresh().await, FetchOutcome::Applied);
    let snapshot = view.snapshot();
    assert_eq!(snapshot.rows.len(), 10);
    assert_eq!(snapshot.total_pages, 3);
    assert_eq!(snapshot.query.page, 0);
    assert_eq!(snapshot.query.page_size, 10);
    assert_eq!(snapshot.query.sort_param(), "id,asc");

    // Updated(5): replaced at the same position, no network call.
    let mut updated = flat(5);
    updated.price = 999.0;
    let outcome = view.handle_event(ChangeEvent::Updated(updated.clone())).await;
    assert_eq!(outcome, Reconciliation::Patched { index: 4 });
    assert_eq!(fetcher.call_count(), 1);
    let rows = view.rows();
    assert_eq!(ids(&rows), (1..=10).collect::<Vec<_>>());
    assert_eq!(rows[4], updated);
    assert_eq!(rows[3], flat(4));

    // Created: exactly one re-fetch of the same query, never a local insert.
    let fresh: Vec<Flat> = flats([11, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    fetcher.push_page(fresh.clone(), 3);
    let outcome = view.handle_event(ChangeEvent::Created(flat(11))).await;
    assert_eq!(outcome, Reconciliation::Refetch(RefetchReason::Created));
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(view.rows(), fresh);

    let calls = fetcher.calls();
    assert_eq!(calls[0], calls[1]);
}

#[tokio::test]
async fn test_delete_of_absent_id_still_refetches() {
    let fetcher = MockFetcher::new().with_page(flats(1..=10), 2);
    let view = CollectionView::new(fetcher.clone(), Query::new());
    view.refresh().await;

    fetcher.push_page(flats(1..=10), 2);
    let outcome = view.handle_event(ChangeEvent::Deleted(42)).await;
    assert_eq!(outcome, Reconciliation::Refetch(RefetchReason::Deleted));
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(view.rows().len(), 10);
}

#[tokio::test]
async fn test_delete_of_visible_row_waits_for_server() {
    let fetcher = MockFetcher::new().with_page(flats(1..=3), 1);
    let view = CollectionView::new(fetcher.clone(), Query::new());
    view.refresh().await;

    fetcher.push_page(flats([1, 3]), 1);
    view.handle_event(ChangeEvent::Deleted(2)).await;
    assert_eq!(ids(&view.rows()), vec![1, 3]);
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn test_stale_update_after_delete_does_not_resurrect() {
    let fetcher = MockFetcher::new().with_page(flats(1..=3), 1);
    let view = CollectionView::new(fetcher.clone(), Query::new());
    view.refresh().await;

    fetcher.push_page(flats([1, 3]), 1);
    view.handle_event(ChangeEvent::Deleted(2)).await;

    fetcher.push_page(flats([1, 3]), 1);
    let outcome = view.handle_event(ChangeEvent::Updated(flat(2))).await;
    assert_eq!(
        outcome,
        Reconciliation::Refetch(RefetchReason::UpdatedNotVisible)
    );
    assert_eq!(ids(&view.rows()), vec![1, 3]);
}

#[tokio::test]
async fn test_repeated_update_is_idempotent() {
    let fetcher = MockFetcher::new().with_page(flats(1..=4), 1);
    let view = CollectionView::new(fetcher.clone(), Query::new());
    view.refresh().await;

    let mut updated = flat(3);
    updated.name = "Penthouse".to_string();
    view.handle_event(ChangeEvent::Updated(updated.clone())).await;
    let once = view.rows();
    view.handle_event(ChangeEvent::Updated(updated)).await;
    assert_eq!(view.rows(), once);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_oversized_page_is_truncated() {
    let fetcher = MockFetcher::new().with_page(flats(1..=12), 2);
    let view = CollectionView::new(fetcher, Query::new());
    view.refresh().await;
    let snapshot = view.snapshot();
    assert!(snapshot.rows.len() <= snapshot.query.page_size as usize);
    assert_eq!(ids(&snapshot.rows), (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_failed_refetch_keeps_stale_rows() {
    let fetcher = MockFetcher::new().with_page(flats(1..=3), 1);
    let view = CollectionView::new(fetcher.clone(), Query::new());
    view.refresh().await;
    let mut notes = view.subscribe_notifications();

    fetcher.push_failure(
        Error::Network("connection reset".to_string()),
        std::time::Duration::ZERO,
    );
    let outcome = view.handle_event(ChangeEvent::Created(flat(4))).await;
    assert!(outcome.needs_refetch());
    assert_eq!(ids(&view.rows()), vec![1, 2, 3]);
    assert!(!view.is_loading());

    let note = notes.recv().await.unwrap();
    assert!(note.is_error());
    assert_eq!(note.status, Some(500));
}
