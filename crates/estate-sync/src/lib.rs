//! # estate-sync
//!
//! Live collection views for the estate catalog.
//!
//! A [`CollectionView`] owns one screen's query and rows and applies fetch
//! results with a last-fetch-wins guard. A [`LiveView`] binds it to the
//! shared [`PushHub`], feeding change events through the [`Reconciler`]:
//! updates of visible rows are patched in place, everything else re-fetches
//! the current page.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use estate_client::{EntityFetcher, RestClient};
//! use estate_core::{Flat, Query};
//! use estate_sync::{CollectionView, LiveView, PushConfig, PushHub, WsConnector};
//!
//! # async fn run() -> estate_core::Result<()> {
//! let client = Arc::new(RestClient::from_env()?);
//! let config = PushConfig::from_env();
//! let hub = PushHub::new(WsConnector::new(config.ws_url.clone()), config);
//!
//! let view = Arc::new(CollectionView::new(EntityFetcher::<Flat>::new(client), Query::new()));
//! let live = LiveView::mount(&hub, Arc::clone(&view)).await;
//! println!("{} flats on page 1", view.rows().len());
//! live.unmount();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod hub;
pub mod live;
pub mod mock;
pub mod notify;
pub mod reconciler;
pub mod stomp;
pub mod transport;
pub mod view;

pub use config::PushConfig;
pub use hub::{Channel, Handler, PushHub};
pub use live::LiveView;
pub use notify::{Notification, Notifier, Severity};
pub use reconciler::{Reconciler, Reconciliation, RefetchReason};
pub use transport::{Connector, FrameTransport, WsConnector};
pub use view::{CollectionView, FetchOutcome, ViewSnapshot};
