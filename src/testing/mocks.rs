//! In-memory broker for exercising the producer without RabbitMQ.
//!
//! A [`MockBroker`] owns shared state; the connector, connections and channels
//! it hands out all observe and mutate that state, so tests can inject
//! failures and count releases.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lapin::BasicProperties;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::Endpoint;
use crate::messaging::{
    BrokerChannel, BrokerConnection, ChannelError, ConnectionError, Connector, DeclareError,
    PublishError, QueueDescriptor, QueueHandle, Ticker,
};

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub queue: String,
    pub payload: Vec<u8>,
    pub properties: BasicProperties,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct BrokerState {
    unreachable: bool,
    refuse_channels: bool,
    channel_delay: Option<Duration>,
    publish_delay: Option<Duration>,
    // Bumped to sever every connection opened before it.
    generation: u64,
    queues: HashMap<String, bool>,
    failing_attempts: HashSet<usize>,
    published: Vec<PublishedMessage>,
    publish_attempts: usize,
    connects: usize,
    connection_closes: usize,
    channel_closes: usize,
    next_channel_id: u16,
}

#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            broker: self.clone(),
        }
    }

    /// Pre-creates a queue, as if another client had declared it.
    pub fn with_queue(self, name: &str, durable: bool) -> Self {
        self.state().queues.insert(name.to_string(), durable);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    pub fn refuse_channels(&self, refuse: bool) {
        self.state().refuse_channels = refuse;
    }

    pub fn set_channel_delay(&self, delay: Duration) {
        self.state().channel_delay = Some(delay);
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        self.state().publish_delay = Some(delay);
    }

    /// Makes the `attempt`-th publish call (1-based, counted broker-wide) fail.
    pub fn fail_publish_attempt(&self, attempt: usize) {
        self.state().failing_attempts.insert(attempt);
    }

    /// Drops every open connection, as a broker restart would.
    pub fn sever_connections(&self) {
        self.state().generation += 1;
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn publish_attempts(&self) -> usize {
        self.state().publish_attempts
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn connection_closes(&self) -> usize {
        self.state().connection_closes
    }

    pub fn channel_closes(&self) -> usize {
        self.state().channel_closes
    }

    pub fn queue_durability(&self, name: &str) -> Option<bool> {
        self.state().queues.get(name).copied()
    }

    fn is_alive(&self, generation: u64) -> bool {
        self.state().generation == generation
    }
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    broker: MockBroker,
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MockConnection, ConnectionError> {
        let mut state = self.broker.state();
        if state.unreachable {
            return Err(ConnectionError::ConnectionFailed(format!(
                "connection refused by {endpoint}"
            )));
        }

        state.connects += 1;
        Ok(MockConnection {
            broker: self.broker.clone(),
            generation: state.generation,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[derive(Debug)]
pub struct MockConnection {
    broker: MockBroker,
    generation: u64,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    type Channel = MockChannel;

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.broker.is_alive(self.generation)
    }

    async fn open_channel(&self) -> Result<MockChannel, ChannelError> {
        let delay = self.broker.state().channel_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.is_connected() {
            return Err(ChannelError::CreationFailed("connection is closed".into()));
        }

        let mut state = self.broker.state();
        if state.refuse_channels {
            return Err(ChannelError::CreationFailed("channel limit reached".into()));
        }

        state.next_channel_id += 1;
        Ok(MockChannel {
            broker: self.broker.clone(),
            id: state.next_channel_id,
            generation: self.generation,
            connection_closed: self.closed.clone(),
            closed: AtomicBool::new(false),
        })
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closed.store(true, Ordering::SeqCst);
        self.broker.state().connection_closes += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockChannel {
    broker: MockBroker,
    id: u16,
    generation: u64,
    connection_closed: Arc<AtomicBool>,
    closed: AtomicBool,
}

#[async_trait]
impl BrokerChannel for MockChannel {
    fn id(&self) -> u16 {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && !self.connection_closed.load(Ordering::SeqCst)
            && self.broker.is_alive(self.generation)
    }

    async fn declare_queue(
        &self,
        descriptor: &QueueDescriptor,
    ) -> Result<QueueHandle, DeclareError> {
        if !self.is_open() {
            return Err(DeclareError::Rejected {
                queue: descriptor.name.clone(),
                reason: "channel is closed".into(),
            });
        }

        let mut state = self.broker.state();
        let existing = state.queues.get(&descriptor.name).copied();
        match existing {
            Some(durable) if durable != descriptor.durable => {
                // The broker closes the channel on PRECONDITION_FAILED.
                self.closed.store(true, Ordering::SeqCst);
                Err(DeclareError::Conflict {
                    queue: descriptor.name.clone(),
                    reason: format!(
                        "inequivalent arg 'durable': received {}, existing {}",
                        descriptor.durable, durable
                    ),
                })
            }
            _ => {
                state
                    .queues
                    .insert(descriptor.name.clone(), descriptor.durable);
                let messages = state
                    .published
                    .iter()
                    .filter(|message| message.queue == descriptor.name)
                    .count();
                Ok(QueueHandle::new(
                    descriptor.name.clone(),
                    u32::try_from(messages).unwrap_or(u32::MAX),
                    0,
                ))
            }
        }
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublishError> {
        let (attempt, delay) = {
            let mut state = self.broker.state();
            state.publish_attempts += 1;
            (state.publish_attempts, state.publish_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.is_open() {
            return Err(PublishError::ChannelBroken("channel is closed".into()));
        }

        let mut state = self.broker.state();
        if state.failing_attempts.contains(&attempt) {
            return Err(PublishError::Rejected {
                queue: queue.to_string(),
                reason: format!("injected failure on attempt {attempt}"),
            });
        }

        state.published.push(PublishedMessage {
            queue: queue.to_string(),
            payload: payload.to_vec(),
            properties,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        self.broker.state().channel_closes += 1;
        Ok(())
    }
}

/// Ticker driven by hand through a [`TickTrigger`].
pub struct ManualTicker {
    ticks: mpsc::UnboundedReceiver<()>,
}

#[derive(Debug, Clone)]
pub struct TickTrigger {
    ticks: mpsc::UnboundedSender<()>,
}

pub fn manual_ticker() -> (ManualTicker, TickTrigger) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ManualTicker { ticks: rx }, TickTrigger { ticks: tx })
}

impl TickTrigger {
    /// Queues one tick. Returns `false` once the ticker is gone.
    pub fn fire(&self) -> bool {
        self.ticks.send(()).is_ok()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Instant {
        match self.ticks.recv().await {
            Some(()) => Instant::now(),
            None => std::future::pending().await,
        }
    }
}
