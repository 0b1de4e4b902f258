//! Binding between a collection view and the push hub.
//!
//! Mounting subscribes to every topic the backend publishes for the view's
//! entity kind, activates the channel and performs the initial fetch.
//! Message bodies are decoded on the connection task and handed to a
//! per-view worker that applies them one at a time, in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use estate_core::{ChangeEvent, CollectionFetcher, Entity, Topic};

use crate::hub::{Channel, PushHub};
use crate::notify::Notification;
use crate::view::{CollectionView, FetchOutcome};

/// A mounted view receiving live updates.
///
/// Dropping it (or calling [`unmount`](Self::unmount)) deactivates the
/// channel and stops the worker; queued events are discarded. A re-fetch
/// cut short by the stop leaves the shared view with its previous rows and
/// `loading` cleared.
pub struct LiveView<T, F> {
    view: Arc<CollectionView<T, F>>,
    channel: Channel,
    worker: JoinHandle<()>,
}

impl<T, F> LiveView<T, F>
where
    T: Entity,
    F: CollectionFetcher<T> + 'static,
{
    /// Subscribe, activate and fetch the first page.
    pub async fn mount(hub: &PushHub, view: Arc<CollectionView<T, F>>) -> Self {
        let kind = T::KIND;
        let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent<T>>();

        let mut channel = hub.connect();
        for topic in Topic::published_for(kind) {
            let tx = tx.clone();
            let notifier = view.notifier().clone();
            channel.subscribe(topic, move |body| {
                match ChangeEvent::<T>::decode(topic.change, body) {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(e) => {
                        warn!(subsystem = "sync", component = "live", topic = %topic, error = %e, "Undecodable change event");
                        notifier.notify(Notification::error(format!(
                            "Could not read {} change: {}",
                            kind.label().to_lowercase(),
                            e
                        )));
                    }
                }
            });
        }
        drop(tx);

        let worker_view = Arc::clone(&view);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                worker_view.handle_event(event).await;
            }
            debug!(subsystem = "sync", component = "live", entity = %kind, "Event worker finished");
        });

        channel.activate();
        info!(subsystem = "sync", component = "live", entity = %kind, "View mounted");

        if view.refresh().await == FetchOutcome::Failed {
            warn!(subsystem = "sync", component = "live", entity = %kind, "Initial fetch failed");
        }

        Self {
            view,
            channel,
            worker,
        }
    }

    pub fn view(&self) -> &Arc<CollectionView<T, F>> {
        &self.view
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_active()
    }

    /// Stop receiving updates.
    pub fn unmount(self) {
        drop(self);
    }
}

impl<T, F> Drop for LiveView<T, F> {
    fn drop(&mut self) {
        self.channel.deactivate();
        self.worker.abort();
        debug!(subsystem = "sync", component = "live", "View unmounted");
    }
}
