//! Broker abstraction used by the session and publisher.
//!
//! The lapin implementations live in [`super::connection`] and [`super::channel`];
//! in-memory doubles live in [`crate::testing`].

use async_trait::async_trait;
use lapin::BasicProperties;

use super::channel::ChannelError;
use super::connection::ConnectionError;
use super::publisher::PublishError;
use super::queue::{DeclareError, QueueDescriptor, QueueHandle};
use crate::config::Endpoint;

/// Opens transport sessions to a broker endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: BrokerConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection, ConnectionError>;
}

/// An established transport session.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    type Channel: BrokerChannel;

    fn is_connected(&self) -> bool;

    async fn open_channel(&self) -> Result<Self::Channel, ChannelError>;

    /// Releases the connection and every channel derived from it.
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// A channel capable of queue declaration and publishing.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    fn id(&self) -> u16;

    fn is_open(&self) -> bool;

    async fn declare_queue(
        &self,
        descriptor: &QueueDescriptor,
    ) -> Result<QueueHandle, DeclareError>;

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublishError>;

    async fn close(&self) -> Result<(), ChannelError>;
}
