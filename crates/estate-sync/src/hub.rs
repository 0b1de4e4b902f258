//! Shared push connection with per-view channels.
//!
//! A [`PushHub`] owns at most one physical STOMP connection. Views obtain a
//! [`Channel`] from it, register handlers per [`Topic`], and activate the
//! channel while they are mounted. The hub reference counts topics across
//! channels:
//!
//! - the first handler on a topic sends `SUBSCRIBE`, the last one removed
//!   sends `UNSUBSCRIBE`;
//! - the first active channel opens the connection, the last one to
//!   deactivate closes it with `DISCONNECT`.
//!
//! Handlers run on the connection task with the hub's state lock held, so
//! once [`Channel::deactivate`] returns none of that channel's handlers is
//! invoked again. Handlers must therefore be quick and must not call back
//! into the hub.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use estate_core::{Error, Result, Topic};

use crate::config::PushConfig;
use crate::stomp::{Command, Frame};
use crate::transport::{Connector, FrameTransport};

/// Callback receiving the raw body of a message on its topic.
pub type Handler = Arc<dyn Fn(&str) + Send + Sync>;

type HandlerId = u64;

enum HubCommand {
    Send(Frame),
    Shutdown,
}

struct TopicEntry {
    subscription_id: String,
    handlers: BTreeMap<HandlerId, Handler>,
}

/// The connection task and the queue feeding it.
struct Link {
    generation: u64,
    commands: mpsc::UnboundedSender<HubCommand>,
    /// True between CONNECTED and the end of the session.
    connected: bool,
    task: JoinHandle<()>,
}

impl Link {
    fn send(&self, frame: Frame) {
        let _ = self.commands.send(HubCommand::Send(frame));
    }
}

#[derive(Default)]
struct HubState {
    topics: HashMap<Topic, TopicEntry>,
    active_channels: usize,
    next_handler_id: HandlerId,
    next_subscription: u64,
    next_generation: u64,
    link: Option<Link>,
}

impl HubState {
    /// The link, if it is connected and frames can be sent.
    fn connected_link(&self) -> Option<&Link> {
        self.link.as_ref().filter(|link| link.connected)
    }

    fn owns(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }
}

struct HubInner {
    connector: Arc<dyn Connector>,
    config: PushConfig,
    state: Mutex<HubState>,
}

/// How one connected session ended.
enum SessionEnd {
    Shutdown,
    Closed,
}

/// Shared push connection. Cheap to clone.
#[derive(Clone)]
pub struct PushHub {
    inner: Arc<HubInner>,
}

impl PushHub {
    pub fn new(connector: impl Connector, config: PushConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                connector: Arc::new(connector),
                config,
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    /// New inactive channel on this hub. Nothing is opened until it is activated.
    pub fn connect(&self) -> Channel {
        Channel {
            hub: self.clone(),
            subscriptions: Vec::new(),
            registrations: Vec::new(),
            active: false,
        }
    }

    pub fn config(&self) -> &PushConfig {
        &self.inner.config
    }

    /// Number of currently active channels.
    pub fn active_channels(&self) -> usize {
        self.inner.lock().active_channels
    }

    /// Number of topics with at least one handler.
    pub fn topic_count(&self) -> usize {
        self.inner.lock().topics.len()
    }

    pub fn handler_count(&self, topic: Topic) -> usize {
        self.inner
            .lock()
            .topics
            .get(&topic)
            .map_or(0, |entry| entry.handlers.len())
    }

    /// Whether a STOMP session is currently established.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected_link().is_some()
    }
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` on `topic`, subscribing if it is the first one.
    fn add_handler(state: &mut HubState, topic: Topic, handler: Handler) -> HandlerId {
        let handler_id = state.next_handler_id;
        state.next_handler_id += 1;

        if !state.topics.contains_key(&topic) {
            let subscription_id = format!("sub-{}", state.next_subscription);
            state.next_subscription += 1;
            debug!(subsystem = "push", component = "hub", topic = %topic, subscription_id = %subscription_id, "Subscribing");
            if let Some(link) = state.connected_link() {
                link.send(Frame::subscribe(&subscription_id, &topic.destination()));
            }
            state.topics.insert(
                topic,
                TopicEntry {
                    subscription_id,
                    handlers: BTreeMap::new(),
                },
            );
        }
        if let Some(entry) = state.topics.get_mut(&topic) {
            entry.handlers.insert(handler_id, handler);
        }
        handler_id
    }

    /// Remove one handler, unsubscribing when it was the last on its topic.
    fn remove_handler(state: &mut HubState, topic: Topic, handler_id: HandlerId) {
        let Some(entry) = state.topics.get_mut(&topic) else {
            return;
        };
        entry.handlers.remove(&handler_id);
        if !entry.handlers.is_empty() {
            return;
        }
        if let Some(entry) = state.topics.remove(&topic) {
            debug!(subsystem = "push", component = "hub", topic = %topic, subscription_id = %entry.subscription_id, "Unsubscribing");
            if let Some(link) = state.connected_link() {
                link.send(Frame::unsubscribe(&entry.subscription_id));
            }
        }
    }

    /// Invoke every handler for the topic a MESSAGE frame was delivered on.
    fn dispatch(&self, frame: &Frame) {
        let state = self.lock();
        let entry = frame
            .header("destination")
            .and_then(|dest| dest.parse::<Topic>().ok())
            .and_then(|topic| state.topics.get(&topic))
            .or_else(|| {
                let sub = frame.header("subscription")?;
                state
                    .topics
                    .values()
                    .find(|entry| entry.subscription_id == sub)
            });

        match entry {
            Some(entry) => {
                for handler in entry.handlers.values() {
                    handler(&frame.body);
                }
            }
            None => debug!(
                subsystem = "push",
                component = "hub",
                destination = frame.header("destination").unwrap_or(""),
                "Dropping message for a topic with no handlers"
            ),
        }
    }

    /// Mark the session connected and queue SUBSCRIBE for every live topic.
    ///
    /// Returns false when the link was shut down during the handshake.
    fn mark_connected(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if !state.owns(generation) {
            return false;
        }
        let frames: Vec<Frame> = state
            .topics
            .iter()
            .map(|(topic, entry)| Frame::subscribe(&entry.subscription_id, &topic.destination()))
            .collect();
        if let Some(link) = state.link.as_mut() {
            link.connected = true;
            for frame in frames {
                link.send(frame);
            }
        }
        true
    }

    fn mark_disconnected(&self, generation: u64) {
        let mut state = self.lock();
        if let Some(link) = state.link.as_mut().filter(|l| l.generation == generation) {
            link.connected = false;
        }
    }

    /// Drop the link record if the exiting task still owns it.
    fn link_finished(&self, generation: u64) {
        let mut state = self.lock();
        if state.owns(generation) {
            state.link = None;
        }
    }

    /// Run one STOMP session: connect, handshake, then pump frames.
    async fn session(
        &self,
        generation: u64,
        commands: &mut mpsc::UnboundedReceiver<HubCommand>,
    ) -> Result<SessionEnd> {
        let mut transport = self.connector.connect().await?;
        transport.send(Frame::connect(self.config.host())).await?;

        let server = time::timeout(self.config.connect_timeout, await_connected(&mut *transport))
            .await
            .map_err(|_| Error::Transport("Timed out waiting for CONNECTED".to_string()))??;
        info!(
            subsystem = "push",
            component = "hub",
            url = %self.config.ws_url,
            server = server.as_deref().unwrap_or("unknown"),
            "Push channel connected"
        );

        if !self.mark_connected(generation) {
            let _ = transport.send(Frame::disconnect()).await;
            let _ = transport.close().await;
            return Ok(SessionEnd::Shutdown);
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(HubCommand::Send(frame)) => transport.send(frame).await?,
                    Some(HubCommand::Shutdown) | None => {
                        let _ = transport.send(Frame::disconnect()).await;
                        let _ = transport.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                },
                incoming = transport.recv() => match incoming {
                    Some(Ok(frame)) => self.handle_frame(frame)?,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(SessionEnd::Closed),
                },
            }
        }
    }

    fn handle_frame(&self, frame: Frame) -> Result<()> {
        match frame.command {
            Command::Message => {
                self.dispatch(&frame);
                Ok(())
            }
            Command::Error => Err(Error::Transport(format!(
                "Server sent ERROR: {}",
                frame.header("message").unwrap_or(frame.body.as_str())
            ))),
            other => {
                debug!(subsystem = "push", component = "hub", command = %other, "Ignoring frame");
                Ok(())
            }
        }
    }
}

/// Read frames until CONNECTED, returning its `server` header.
async fn await_connected(transport: &mut dyn FrameTransport) -> Result<Option<String>> {
    loop {
        match transport.recv().await {
            Some(Ok(frame)) => match frame.command {
                Command::Connected => return Ok(frame.header("server").map(str::to_string)),
                Command::Error => {
                    return Err(Error::Transport(format!(
                        "Connection rejected: {}",
                        frame.header("message").unwrap_or(frame.body.as_str())
                    )))
                }
                _ => continue,
            },
            Some(Err(e)) => return Err(e),
            None => {
                return Err(Error::Transport(
                    "Connection closed during handshake".to_string(),
                ))
            }
        }
    }
}

/// Connection task: sessions until shutdown, reconnecting if configured.
async fn run_link(
    inner: Arc<HubInner>,
    generation: u64,
    mut commands: mpsc::UnboundedReceiver<HubCommand>,
) {
    loop {
        let end = inner.session(generation, &mut commands).await;
        inner.mark_disconnected(generation);
        match end {
            Ok(SessionEnd::Shutdown) => {
                info!(subsystem = "push", component = "hub", "Push channel disconnected");
                break;
            }
            Ok(SessionEnd::Closed) => {
                warn!(subsystem = "push", component = "hub", "Push channel closed by server")
            }
            Err(e) => error!(
                subsystem = "push",
                component = "hub",
                url = %inner.config.ws_url,
                error = %e,
                "Push channel failed"
            ),
        }

        let Some(delay) = inner.config.reconnect_delay else {
            break;
        };
        if !wait_for_reconnect(delay, &mut commands).await {
            break;
        }
        info!(subsystem = "push", component = "hub", delay_ms = delay.as_millis() as u64, "Reconnecting push channel");
    }
    inner.link_finished(generation);
}

/// Sleep until the reconnect delay elapses. False if shut down meanwhile.
///
/// Frames queued while disconnected are dropped; the next session
/// resubscribes every live topic.
async fn wait_for_reconnect(
    delay: std::time::Duration,
    commands: &mut mpsc::UnboundedReceiver<HubCommand>,
) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return true,
            command = commands.recv() => match command {
                Some(HubCommand::Send(_)) => continue,
                Some(HubCommand::Shutdown) | None => return false,
            },
        }
    }
}

/// One view's handle on the hub.
///
/// Subscriptions are declared with [`subscribe`](Self::subscribe) and take
/// effect while the channel is active. Dropping the channel deactivates it.
pub struct Channel {
    hub: PushHub,
    subscriptions: Vec<(Topic, Handler)>,
    /// Handler registrations held while active.
    registrations: Vec<(Topic, HandlerId)>,
    active: bool,
}

impl Channel {
    /// Deliver the body of every message on `topic` to `handler`.
    pub fn subscribe(&mut self, topic: Topic, handler: impl Fn(&str) + Send + Sync + 'static) {
        let handler: Handler = Arc::new(handler);
        if self.active {
            let mut state = self.hub.inner.lock();
            let id = HubInner::add_handler(&mut state, topic, Arc::clone(&handler));
            self.registrations.push((topic, id));
        }
        self.subscriptions.push((topic, handler));
    }

    /// Start receiving. Opens the shared connection if none is running.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        let inner = &self.hub.inner;
        let mut state = inner.lock();
        for (topic, handler) in &self.subscriptions {
            let id = HubInner::add_handler(&mut state, *topic, Arc::clone(handler));
            self.registrations.push((*topic, id));
        }
        state.active_channels += 1;
        self.active = true;
        debug!(subsystem = "push", component = "hub", active = state.active_channels, "Channel activated");

        if state.link.is_none() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let (tx, rx) = mpsc::unbounded_channel();
                    let task = runtime.spawn(run_link(Arc::clone(inner), generation, rx));
                    state.link = Some(Link {
                        generation,
                        commands: tx,
                        connected: false,
                        task,
                    });
                }
                Err(e) => error!(
                    subsystem = "push",
                    component = "hub",
                    error = %e,
                    "Cannot open push channel outside a tokio runtime"
                ),
            }
        }
    }

    /// Stop receiving. When this was the last active channel the connection
    /// is closed.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        let mut state = self.hub.inner.lock();
        for (topic, id) in self.registrations.drain(..) {
            HubInner::remove_handler(&mut state, topic, id);
        }
        state.active_channels -= 1;
        self.active = false;
        debug!(subsystem = "push", component = "hub", active = state.active_channels, "Channel deactivated");

        if state.active_channels == 0 {
            if let Some(link) = state.link.take() {
                if link.commands.send(HubCommand::Shutdown).is_err() {
                    link.task.abort();
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.subscriptions.iter().map(|(topic, _)| *topic)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryConnector;
    use estate_core::{ChangeKind, EntityKind};

    fn topic(change: ChangeKind) -> Topic {
        Topic::new(change, EntityKind::House)
    }

    #[tokio::test]
    async fn test_refcounts_without_runtime_connection() {
        let (connector, _server) = MemoryConnector::new();
        let hub = PushHub::new(connector, PushConfig::default());

        let mut a = hub.connect();
        a.subscribe(topic(ChangeKind::Updated), |_| {});
        let mut b = hub.connect();
        b.subscribe(topic(ChangeKind::Updated), |_| {});
        b.subscribe(topic(ChangeKind::Created), |_| {});

        assert_eq!(hub.topic_count(), 0);
        a.activate();
        b.activate();
        assert_eq!(hub.active_channels(), 2);
        assert_eq!(hub.topic_count(), 2);
        assert_eq!(hub.handler_count(topic(ChangeKind::Updated)), 2);

        a.deactivate();
        assert_eq!(hub.handler_count(topic(ChangeKind::Updated)), 1);
        drop(b);
        assert_eq!(hub.active_channels(), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_activate_and_deactivate_are_idempotent() {
        let (connector, _server) = MemoryConnector::new();
        let hub = PushHub::new(connector, PushConfig::default());
        let mut channel = hub.connect();
        channel.subscribe(topic(ChangeKind::Deleted), |_| {});

        channel.activate();
        channel.activate();
        assert_eq!(hub.active_channels(), 1);
        assert_eq!(hub.handler_count(topic(ChangeKind::Deleted)), 1);

        channel.deactivate();
        channel.deactivate();
        assert_eq!(hub.active_channels(), 0);
        assert!(!channel.is_active());
    }

    #[tokio::test]
    async fn test_subscribe_while_active_registers_immediately() {
        let (connector, _server) = MemoryConnector::new();
        let hub = PushHub::new(connector, PushConfig::default());
        let mut channel = hub.connect();
        channel.activate();
        channel.subscribe(topic(ChangeKind::Created), |_| {});
        assert_eq!(hub.handler_count(topic(ChangeKind::Created)), 1);
        assert_eq!(channel.topics().count(), 1);
    }

    #[test]
    fn test_activate_outside_runtime_does_not_panic() {
        let (connector, _server) = MemoryConnector::new();
        let hub = PushHub::new(connector, PushConfig::default());
        let mut channel = hub.connect();
        channel.activate();
        assert!(channel.is_active());
        assert!(!hub.is_connected());
    }
}
