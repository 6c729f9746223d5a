use std::time::Duration;

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection};
use tracing::{debug, error, info};

use super::broker::BrokerChannel;
use super::publisher::PublishError;
use super::queue::{DeclareError, QueueDescriptor, QueueHandle};

const DEFAULT_EXCHANGE: &str = "";

pub struct ChannelProvider;

impl ChannelProvider {
    pub async fn create_channel(connection: &Connection) -> Result<RabbitMqChannel, ChannelError> {
        info!("Creating RabbitMQ channel");

        let channel = connection.create_channel().await.map_err(|e| {
            error!(error = %e, "Failed to create RabbitMQ channel");
            ChannelError::CreationFailed(e.to_string())
        })?;

        info!(channel_id = channel.id(), "Channel created successfully");

        Ok(RabbitMqChannel { channel })
    }
}

pub struct RabbitMqChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for RabbitMqChannel {
    fn id(&self) -> u16 {
        self.channel.id()
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn declare_queue(
        &self,
        descriptor: &QueueDescriptor,
    ) -> Result<QueueHandle, DeclareError> {
        let queue = self
            .channel
            .queue_declare(
                &descriptor.name,
                descriptor.declare_options(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, queue = %descriptor.name, "Queue declaration failed");
                DeclareError::from_lapin(&descriptor.name, e)
            })?;

        Ok(QueueHandle::from(queue))
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublishError> {
        let confirm = self
            .channel
            .basic_publish(
                DEFAULT_EXCHANGE,
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| self.classify(queue, e))?;

        // Without confirm mode this resolves immediately.
        confirm.await.map_err(|e| self.classify(queue, e))?;

        debug!(channel_id = self.channel.id(), queue, "basic.publish sent");
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let channel_id = self.channel.id();
        info!(channel_id, "Closing RabbitMQ channel");

        self.channel
            .close(200, "Normal shutdown")
            .await
            .map_err(|e| {
                error!(error = %e, channel_id, "Failed to close channel gracefully");
                ChannelError::CloseFailed(e.to_string())
            })?;

        info!(channel_id, "Channel closed successfully");
        Ok(())
    }
}

impl RabbitMqChannel {
    fn classify(&self, queue: &str, error: lapin::Error) -> PublishError {
        if self.is_open() {
            PublishError::Rejected {
                queue: queue.to_string(),
                reason: error.to_string(),
            }
        } else {
            PublishError::ChannelBroken(error.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to create channel: {0}")]
    CreationFailed(String),

    #[error("Opening channel timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Failed to close channel: {0}")]
    CloseFailed(String),
}
