use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};
use lapin::BasicProperties;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::broker::Connector;
use super::codec::{self, SerializationError};
use super::queue::QueueDescriptor;
use super::reconnect::{ReconnectPolicy, RecoveryState};
use super::scheduler::Ticker;
use super::session::{BrokerSession, StartupError, Timeouts};
use crate::config::Endpoint;
use crate::metrics::Metrics;

const PERSISTENT: u8 = 2;
const TRANSIENT: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Channel is not usable: {0}")]
    ChannelBroken(String),

    #[error("Broker rejected publish to {queue}: {reason}")]
    Rejected { queue: String, reason: String },

    #[error("Publish to {queue} timed out after {after:?}")]
    Timeout { queue: String, after: Duration },

    #[error("Failed to re-establish broker session: {0}")]
    Recovery(String),

    #[error("Record source exhausted")]
    SourceExhausted,

    #[error("Publish loop stopped during session recovery")]
    Interrupted,
}

impl PublishError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "serialization",
            Self::ChannelBroken(_) => "channel_broken",
            Self::Rejected { .. } => "rejected",
            Self::Timeout { .. } => "timeout",
            Self::Recovery(_) => "recovery",
            Self::SourceExhausted => "source_exhausted",
            Self::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub failed: u64,
}

/// Drives the periodic publish loop over a [`BrokerSession`].
///
/// Each tick pulls one record from the source, encodes it as JSON and publishes
/// it to the declared queue. A failed tick is logged and counted; it never ends
/// the loop. When the session breaks, one re-establishment attempt is made per
/// tick once the [`ReconnectPolicy`] backoff has elapsed.
pub struct Publisher<K: Connector, S> {
    connector: Arc<K>,
    endpoint: Endpoint,
    descriptor: QueueDescriptor,
    timeouts: Timeouts,
    session: Option<BrokerSession<K::Connection>>,
    reconnect: ReconnectPolicy,
    recovery: RecoveryState,
    source: S,
    app_id: String,
    metrics: Arc<Metrics>,
    stats: PublisherStats,
    shutdown: Arc<Notify>,
}

impl<K, S> Publisher<K, S>
where
    K: Connector,
    S: Stream + Unpin,
    S::Item: Serialize + Debug,
{
    pub fn new(
        session: BrokerSession<K::Connection>,
        connector: Arc<K>,
        endpoint: Endpoint,
        source: S,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.session_ready.set(1.0);

        Self {
            connector,
            endpoint,
            descriptor: session.descriptor().clone(),
            timeouts: session.timeouts(),
            session: Some(session),
            reconnect: ReconnectPolicy::default(),
            recovery: RecoveryState::default(),
            source,
            app_id: env!("CARGO_PKG_NAME").to_string(),
            metrics,
            stats: PublisherStats::default(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    pub fn is_ready(&self) -> bool {
        self.session.as_ref().is_some_and(BrokerSession::is_ready)
    }

    /// Runs a single tick and returns the number of bytes published.
    ///
    /// Failures are logged and counted here before being returned.
    pub async fn tick(&mut self) -> Result<usize, PublishError> {
        self.refresh_readiness();

        let started = std::time::Instant::now();
        let result = self.publish_next().await;
        let elapsed = started.elapsed().as_secs_f64();
        let queue = self.descriptor.name.as_str();

        match &result {
            Ok(_) => {
                self.stats.published += 1;
                self.metrics
                    .messages_published_total
                    .with_label_values(&[queue])
                    .inc();
                self.metrics
                    .publish_duration_seconds
                    .with_label_values(&[queue, "success"])
                    .observe(elapsed);
            }
            Err(PublishError::SourceExhausted | PublishError::Interrupted) => {}
            Err(e) => {
                self.stats.failed += 1;
                self.metrics
                    .publish_failures_total
                    .with_label_values(&[queue, e.error_type()])
                    .inc();
                self.metrics
                    .publish_duration_seconds
                    .with_label_values(&[queue, "failure"])
                    .observe(elapsed);
                error!(
                    queue,
                    error = %e,
                    error_type = e.error_type(),
                    failed = self.stats.failed,
                    "Publish tick failed"
                );
            }
        }

        result
    }

    async fn publish_next(&mut self) -> Result<usize, PublishError> {
        self.ensure_session().await?;

        let record = self
            .source
            .next()
            .await
            .ok_or(PublishError::SourceExhausted)?;
        let payload = codec::encode(&record)?;
        let properties = self.properties();

        let Some(session) = self.session.as_ref() else {
            return Err(PublishError::ChannelBroken("no broker session".to_string()));
        };

        if let Err(e) = session.publish(&payload, properties).await {
            if !session.is_ready() {
                self.metrics.session_ready.set(0.0);
            }
            return Err(e);
        }

        info!(
            queue = %self.descriptor.name,
            bytes = payload.len(),
            record = ?record,
            "Record published"
        );

        Ok(payload.len())
    }

    // Brings the readiness gauge in line with the session before a tick uses it.
    fn refresh_readiness(&self) {
        let ready = if self.is_ready() { 1.0 } else { 0.0 };
        self.metrics.session_ready.set(ready);
    }

    async fn ensure_session(&mut self) -> Result<(), PublishError> {
        if self.is_ready() {
            return Ok(());
        }

        self.metrics.session_ready.set(0.0);
        if let Some(stale) = self.session.take() {
            warn!(queue = %self.descriptor.name, "Broker session broken, releasing it");
            stale.shutdown().await;
        }

        if self.recovery.is_exhausted(&self.reconnect) {
            return Err(PublishError::ChannelBroken(format!(
                "reconnect abandoned after {} attempts",
                self.recovery.failures()
            )));
        }

        let now = Instant::now();
        if !self.recovery.is_due(now) {
            return Err(PublishError::ChannelBroken(
                "waiting for reconnect backoff".to_string(),
            ));
        }

        self.metrics.reconnect_attempts_total.inc();
        info!(
            endpoint = %self.endpoint,
            attempt = self.recovery.failures() + 1,
            "Re-establishing broker session"
        );

        let shutdown = self.shutdown.clone();
        match BrokerSession::establish_until(
            self.connector.as_ref(),
            &self.endpoint,
            &self.descriptor,
            self.timeouts,
            shutdown.notified(),
        )
        .await
        {
            Ok(session) => {
                info!(queue = session.queue().name(), "Broker session recovered");
                self.recovery.reset();
                self.session = Some(session);
                self.metrics.session_ready.set(1.0);
                Ok(())
            }
            Err(StartupError::Interrupted) => Err(PublishError::Interrupted),
            Err(e) => {
                let retry_in = self.recovery.record_failure(&self.reconnect, now);
                warn!(
                    error = %e,
                    failures = self.recovery.failures(),
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Broker session recovery failed"
                );
                Err(PublishError::Recovery(e.to_string()))
            }
        }
    }

    fn properties(&self) -> BasicProperties {
        let delivery_mode = if self.descriptor.durable {
            PERSISTENT
        } else {
            TRANSIENT
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        BasicProperties::default()
            .with_content_type(codec::CONTENT_TYPE.into())
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_app_id(self.app_id.clone().into())
            .with_timestamp(timestamp)
            .with_delivery_mode(delivery_mode)
    }

    /// Ticks until the loop is stopped or the source runs dry, then releases
    /// the session.
    async fn run<T: Ticker>(mut self, mut ticker: T) -> PublisherStats {
        info!(queue = %self.descriptor.name, "Publish loop started");
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    info!(queue = %self.descriptor.name, "Shutdown signal received, stopping publish loop");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Err(PublishError::SourceExhausted) => {
                            warn!(queue = %self.descriptor.name, "Record source exhausted, stopping publish loop");
                            break;
                        }
                        // The stop notification was taken by the recovery attempt.
                        Err(PublishError::Interrupted) => {
                            info!(queue = %self.descriptor.name, "Shutdown signal received during recovery, stopping publish loop");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        self.release().await;

        info!(
            queue = %self.descriptor.name,
            published = self.stats.published,
            failed = self.stats.failed,
            "Publish loop stopped"
        );
        self.stats
    }

    async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
        self.metrics.session_ready.set(0.0);
    }
}

impl<K, S> Publisher<K, S>
where
    K: Connector + 'static,
    S: Stream + Unpin + Send + 'static,
    S::Item: Serialize + Debug + Send,
{
    pub fn start<T>(self, ticker: T) -> PublisherHandle
    where
        T: Ticker + 'static,
    {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run(ticker));

        PublisherHandle { shutdown, task }
    }
}

/// Handle to a running publish loop.
pub struct PublisherHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<PublisherStats>,
}

impl PublisherHandle {
    /// Stops the loop, waits for it to release the session and returns its totals.
    pub async fn stop(self) -> Result<PublisherStats, JoinError> {
        self.shutdown.notify_one();
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_labels_are_distinct() {
        let errors = [
            PublishError::ChannelBroken("x".into()),
            PublishError::Rejected {
                queue: "q".into(),
                reason: "x".into(),
            },
            PublishError::Timeout {
                queue: "q".into(),
                after: Duration::from_secs(1),
            },
            PublishError::Recovery("x".into()),
            PublishError::SourceExhausted,
            PublishError::Interrupted,
        ];

        let mut labels: Vec<&str> = errors.iter().map(PublishError::error_type).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), errors.len());
    }
}
