//! Test doubles for views and the push hub.
//!
//! - [`MockFetcher`]: scripted [`CollectionFetcher`] with per-response delays
//!   and a call log, for driving views deterministically (pair with
//!   `#[tokio::test(start_paused = true)]` to control ordering).
//! - [`MemoryConnector`]: in-process transport; each connect hands the test
//!   a [`MemoryPeer`] that plays the STOMP broker.
//!
//! ## Usage
//!
//! ```rust
//! use estate_core::{CollectionFetcher, House, Query};
//! use estate_sync::mock::MockFetcher;
//!
//! # async fn demo() {
//! let fetcher = MockFetcher::<House>::new().with_page(vec![], 1);
//! let page = fetcher.fetch(&Query::new()).await.unwrap();
//! assert!(page.items.is_empty());
//! assert_eq!(fetcher.call_count(), 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use estate_core::{CollectionFetcher, Entity, Error, PageResult, Query, Result};

use crate::stomp::{Command, Frame};
use crate::transport::{Connector, FrameTransport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// FETCHER
// =============================================================================

struct Scripted<T> {
    delay: Duration,
    result: Result<PageResult<T>>,
}

/// Fetcher answering from a queue of scripted responses.
///
/// Each call consumes the next response. With the queue empty it returns an
/// empty single page.
pub struct MockFetcher<T> {
    script: Arc<Mutex<VecDeque<Scripted<T>>>>,
    calls: Arc<Mutex<Vec<Query>>>,
}

impl<T> Clone for MockFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for MockFetcher<T> {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> MockFetcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, items: Vec<T>, total_pages: u32) -> Self {
        self.push_delayed_page(items, total_pages, Duration::ZERO);
        self
    }

    pub fn with_delayed_page(self, items: Vec<T>, total_pages: u32, delay: Duration) -> Self {
        self.push_delayed_page(items, total_pages, delay);
        self
    }

    pub fn with_failure(self, error: Error) -> Self {
        self.push_failure(error, Duration::ZERO);
        self
    }

    /// Queue a response after construction (the fetcher may be shared).
    pub fn push_page(&self, items: Vec<T>, total_pages: u32) {
        self.push_delayed_page(items, total_pages, Duration::ZERO);
    }

    pub fn push_delayed_page(&self, items: Vec<T>, total_pages: u32, delay: Duration) {
        lock(&self.script).push_back(Scripted {
            delay,
            result: Ok(PageResult::new(items, total_pages)),
        });
    }

    pub fn push_failure(&self, error: Error, delay: Duration) {
        lock(&self.script).push_back(Scripted {
            delay,
            result: Err(error),
        });
    }

    /// Queries received so far, in call order.
    pub fn calls(&self) -> Vec<Query> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear()
    }

    /// Scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl<T: Entity> CollectionFetcher<T> for MockFetcher<T> {
    async fn fetch(&self, query: &Query) -> Result<PageResult<T>> {
        lock(&self.calls).push(query.clone());
        let next = lock(&self.script).pop_front();
        match next {
            Some(Scripted { delay, result }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(PageResult::new(Vec::new(), 1)),
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Connector producing in-memory transports.
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

/// Test side of a [`MemoryConnector`]: accepts the connections it opens.
pub struct MemoryServer {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refusals = Arc::new(AtomicUsize::new(0));
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                peers: tx,
                refusals: Arc::clone(&refusals),
                attempts: Arc::clone(&attempts),
            },
            MemoryServer {
                peers: rx,
                refusals,
                attempts,
            },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Transport("Connection refused".to_string()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.peers
            .send(MemoryPeer {
                to_client: Some(to_client),
                from_client,
            })
            .map_err(|_| Error::Transport("Memory server is gone".to_string()))?;
        Ok(Box::new(MemoryTransport {
            outgoing: to_server,
            incoming: from_server,
        }))
    }
}

impl MemoryServer {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Connection attempts so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Broker end of one in-memory connection.
pub struct MemoryPeer {
    to_client: Option<mpsc::UnboundedSender<Frame>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Next frame sent by the client. `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next frame, failing the test unless it has the expected command.
    pub async fn expect(&mut self, command: Command) -> Frame {
        match self.recv().await {
            Some(frame) if frame.command == command => frame,
            other => panic!("Expected {} frame, got {:?}", command, other),
        }
    }

    pub fn send(&self, frame: Frame) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(frame);
        }
    }

    /// Accept CONNECT and answer CONNECTED.
    pub async fn handshake(&mut self) -> Frame {
        let connect = self.expect(Command::Connect).await;
        self.send(
            Frame::new(Command::Connected)
                .with_header("version", "1.2")
                .with_header("server", "memory"),
        );
        connect
    }

    /// Deliver a MESSAGE on `destination`.
    pub fn publish(&self, destination: &str, subscription_id: &str, body: &str) {
        self.send(
            Frame::new(Command::Message)
                .with_header("destination", destination)
                .with_header("subscription", subscription_id)
                .with_body(body),
        );
    }

    /// Close the server side; the client sees end of stream.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

/// Client end of one in-memory connection.
pub struct MemoryTransport {
    outgoing: mpsc::UnboundedSender<Frame>,
    incoming: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| Error::Transport("Memory peer closed".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.incoming.recv().await.map(Ok)
    }
}
