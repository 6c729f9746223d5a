use std::future::{self, Future};
use std::time::Duration;

use lapin::BasicProperties;
use tracing::{info, warn};

use super::broker::{BrokerChannel, BrokerConnection, Connector};
use super::channel::ChannelError;
use super::connection::ConnectionError;
use super::publisher::PublishError;
use super::queue::{DeclareError, QueueDescriptor, QueueHandle};
use crate::config::Endpoint;

/// Deadlines applied to every broker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub operation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            operation: Duration::from_secs(5),
        }
    }
}

pub(crate) async fn with_deadline<F, T, E>(
    after: Duration,
    operation: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(after, operation).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(after)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Declare(#[from] DeclareError),

    #[error("Startup interrupted by shutdown signal")]
    Interrupted,
}

/// A connection, the single channel opened on it, and the declared queue.
///
/// Built only through [`BrokerSession::establish`], which releases whatever it
/// opened when a later step fails. [`BrokerSession::shutdown`] consumes the
/// session, so each connection is released once.
pub struct BrokerSession<C: BrokerConnection> {
    connection: C,
    channel: C::Channel,
    queue: QueueHandle,
    descriptor: QueueDescriptor,
    timeouts: Timeouts,
}

impl<C: BrokerConnection> BrokerSession<C> {
    /// connect → open channel → declare queue.
    pub async fn establish<K>(
        connector: &K,
        endpoint: &Endpoint,
        descriptor: &QueueDescriptor,
        timeouts: Timeouts,
    ) -> Result<Self, StartupError>
    where
        K: Connector<Connection = C>,
    {
        Self::establish_until(connector, endpoint, descriptor, timeouts, future::pending()).await
    }

    /// Same as [`establish`](Self::establish), but gives up with
    /// [`StartupError::Interrupted`] as soon as `shutdown` resolves, releasing
    /// anything already opened.
    pub async fn establish_until<K, S>(
        connector: &K,
        endpoint: &Endpoint,
        descriptor: &QueueDescriptor,
        timeouts: Timeouts,
        shutdown: S,
    ) -> Result<Self, StartupError>
    where
        K: Connector<Connection = C>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let connection = tokio::select! {
            biased;
            _ = &mut shutdown => return Err(StartupError::Interrupted),
            result = with_deadline(timeouts.connect, connector.connect(endpoint), |after| {
                ConnectionError::Timeout { after }
            }) => result?,
        };

        let opened = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = with_deadline(timeouts.operation, connection.open_channel(), |after| {
                ChannelError::Timeout { after }
            }) => Some(result),
        };
        let channel = match opened {
            Some(Ok(channel)) => channel,
            Some(Err(e)) => {
                release_connection(&connection, timeouts.operation).await;
                return Err(e.into());
            }
            None => {
                release_connection(&connection, timeouts.operation).await;
                return Err(StartupError::Interrupted);
            }
        };

        let declared = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = declare(&channel, descriptor, timeouts.operation) => Some(result),
        };
        let queue = match declared {
            Some(Ok(queue)) => queue,
            Some(Err(e)) => {
                release_channel(&channel, timeouts.operation).await;
                release_connection(&connection, timeouts.operation).await;
                return Err(e.into());
            }
            None => {
                release_channel(&channel, timeouts.operation).await;
                release_connection(&connection, timeouts.operation).await;
                return Err(StartupError::Interrupted);
            }
        };

        info!(
            endpoint = %endpoint,
            channel_id = channel.id(),
            queue = queue.name(),
            durable = descriptor.durable,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Broker session established"
        );

        Ok(Self {
            connection,
            channel,
            queue,
            descriptor: descriptor.clone(),
            timeouts,
        })
    }

    /// Re-declares a queue on the session's channel. Matching attributes yield
    /// a handle equal to the first one.
    pub async fn declare_queue(
        &self,
        descriptor: &QueueDescriptor,
    ) -> Result<QueueHandle, DeclareError> {
        declare(&self.channel, descriptor, self.timeouts.operation).await
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    pub fn descriptor(&self) -> &QueueDescriptor {
        &self.descriptor
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_connected() && self.channel.is_open()
    }

    pub async fn publish(
        &self,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublishError> {
        let queue = self.queue.name();
        with_deadline(
            self.timeouts.operation,
            self.channel.publish(queue, payload, properties),
            |after| PublishError::Timeout {
                queue: queue.to_string(),
                after,
            },
        )
        .await
    }

    /// Closes the channel, then the connection. Failures are logged; the
    /// session is gone either way.
    pub async fn shutdown(self) {
        release_channel(&self.channel, self.timeouts.operation).await;
        release_connection(&self.connection, self.timeouts.operation).await;
    }
}

async fn declare<Ch: BrokerChannel>(
    channel: &Ch,
    descriptor: &QueueDescriptor,
    after: Duration,
) -> Result<QueueHandle, DeclareError> {
    with_deadline(after, channel.declare_queue(descriptor), |after| {
        DeclareError::Timeout {
            queue: descriptor.name.clone(),
            after,
        }
    })
    .await
}

async fn release_channel<Ch: BrokerChannel>(channel: &Ch, after: Duration) {
    let closed = with_deadline(after, channel.close(), |after| ChannelError::Timeout { after });
    if let Err(e) = closed.await {
        warn!(error = %e, channel_id = channel.id(), "Channel release failed");
    }
}

async fn release_connection<C: BrokerConnection>(connection: &C, after: Duration) {
    let closed = with_deadline(after, connection.close(), |after| ConnectionError::Timeout {
        after,
    });
    if let Err(e) = closed.await {
        warn!(error = %e, "Connection release failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_turns_stalls_into_errors() {
        let stalled = future::pending::<Result<(), String>>();
        let result = with_deadline(Duration::from_millis(50), stalled, |after| {
            format!("timed out after {after:?}")
        })
        .await;

        assert_eq!(result, Err("timed out after 50ms".to_string()));
    }

    #[tokio::test]
    async fn test_deadline_passes_results_through() {
        let ready = future::ready(Ok::<_, String>(7));
        let result = with_deadline(Duration::from_secs(1), ready, |_| String::new()).await;
        assert_eq!(result, Ok(7));
    }
}
